use std::error::Error;

use log::{ info, warn };
use tokio::io::{ AsyncBufReadExt, BufReader };

use crate::binder::{ ChatBinder, SendOutcome };
use crate::cli::JoinArgs;
use crate::client::ChatClient;
use crate::dom::{ ChatBox, DisplayContainer, Document, InputElement };

const QUIT_COMMAND: &str = "/quit";
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Rows of the chat box currently in view, one line each, plus a scroll hint
/// when older lines are above the viewport.
pub fn render_viewport(display: &ChatBox) -> String {
    let mut out = String::new();
    if display.scroll_top() > 0 {
        out.push_str(&format!("-- {} earlier --\n", display.scroll_top()));
    }
    for line in display.visible() {
        out.push_str(&line.to_string());
        out.push('\n');
    }
    out
}

/// Terminal chat session: stdin lines feed the input element, every inbound
/// message goes through the binder and the chat box viewport is redrawn.
pub async fn run(args: JoinArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let (client, mut inbound) = ChatClient::connect(&args.url, &args.username).await?;

    let mut doc = Document::chat_page(&args.input_id, &args.display_id, args.viewport_rows);
    let mut binder = ChatBinder::bind(client, &mut doc, &args.input_id, &args.display_id)?;
    info!("Joined as {}. Type a message and press enter, {} to leave.", args.username, QUIT_COMMAND);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(text) if text.trim() == QUIT_COMMAND => break,
                    Some(text) => {
                        binder.input_mut().set_value(&text);
                        if binder.send_current_message() == SendOutcome::Failed {
                            warn!("Connection lost, leaving chat");
                            break;
                        }
                    }
                    None => break,
                }
            }
            msg = inbound.recv() => {
                match msg {
                    Some(msg) => {
                        binder.on_inbound_message(msg);
                        print!("{}{}", CLEAR_SCREEN, render_viewport(binder.display()));
                    }
                    None => {
                        warn!("Chat server closed the connection");
                        break;
                    }
                }
            }
        }
    }

    binder.into_channel().disconnect().await;
    Ok(())
}
