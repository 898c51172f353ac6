use log::{ debug, warn };

use crate::client::Channel;
use crate::dom::{ BinderError, ChatBox, ChatLine, DisplayContainer, Document, InputElement, TextInput };
use crate::models::chat::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Input was empty or whitespace; nothing sent, field untouched.
    Skipped,
    /// Channel refused the text; field left as typed.
    Failed,
}

/// Connects one input field and one display container to a chat channel.
///
/// The channel is built and connected by the caller and handed over here;
/// get it back with [`ChatBinder::into_channel`] to disconnect it.
pub struct ChatBinder<C, I, D> {
    channel: C,
    input: I,
    display: D,
}

impl<C: Channel> ChatBinder<C, TextInput, ChatBox> {
    /// Detaches the input and display elements with the given ids from `doc`.
    pub fn bind(
        channel: C,
        doc: &mut Document,
        input_id: &str,
        display_id: &str
    ) -> Result<Self, BinderError> {
        let input = doc.take_input(input_id)?;
        let display = doc.take_display(display_id)?;
        Ok(Self::new(channel, input, display))
    }
}

impl<C, I, D> ChatBinder<C, I, D> where C: Channel, I: InputElement, D: DisplayContainer {
    pub fn new(channel: C, input: I, display: D) -> Self {
        Self { channel, input, display }
    }

    pub fn send_current_message(&mut self) -> SendOutcome {
        let text = self.input.value();
        if text.trim().is_empty() {
            return SendOutcome::Skipped;
        }

        match self.channel.send(text) {
            Ok(()) => {
                debug!("Sent {} bytes from #{}", text.len(), self.input.id());
                self.input.set_value("");
                SendOutcome::Sent
            }
            Err(e) => {
                warn!("Failed to send chat message: {}", e);
                SendOutcome::Failed
            }
        }
    }

    pub fn on_inbound_message(&mut self, msg: ChatMessage) {
        self.display.append_child(ChatLine::from(msg));
        let bottom = self.display.max_scroll_top();
        self.display.set_scroll_top(bottom);
    }

    pub fn input(&self) -> &I {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut I {
        &mut self.input
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn into_channel(self) -> C {
        self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use crate::dom::{ DEFAULT_DISPLAY_ID, DEFAULT_INPUT_ID };
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingChannel {
        sent: RefCell<Vec<String>>,
        closed: bool,
    }

    impl Channel for RecordingChannel {
        fn send(&self, text: &str) -> Result<(), ClientError> {
            if self.closed {
                return Err(ClientError::Closed);
            }
            self.sent.borrow_mut().push(text.to_string());
            Ok(())
        }
    }

    fn binder(channel: RecordingChannel) -> ChatBinder<RecordingChannel, TextInput, ChatBox> {
        let mut doc = Document::chat_page(DEFAULT_INPUT_ID, DEFAULT_DISPLAY_ID, 4);
        ChatBinder::bind(channel, &mut doc, DEFAULT_INPUT_ID, DEFAULT_DISPLAY_ID).unwrap()
    }

    fn msg(username: &str, message: &str, time: &str) -> ChatMessage {
        ChatMessage {
            username: username.into(),
            message: message.into(),
            time: time.into(),
        }
    }

    #[test]
    fn empty_or_blank_input_is_not_sent() {
        let mut binder = binder(RecordingChannel::default());

        assert_eq!(binder.send_current_message(), SendOutcome::Skipped);

        binder.input_mut().set_value("   \t ");
        assert_eq!(binder.send_current_message(), SendOutcome::Skipped);
        assert_eq!(binder.input().value(), "   \t ");
        assert!(binder.channel().sent.borrow().is_empty());
    }

    #[test]
    fn non_empty_input_is_sent_verbatim_and_cleared() {
        let mut binder = binder(RecordingChannel::default());
        binder.input_mut().set_value("  hello there ");

        assert_eq!(binder.send_current_message(), SendOutcome::Sent);
        assert_eq!(binder.input().value(), "");
        assert_eq!(*binder.channel().sent.borrow(), vec!["  hello there ".to_string()]);
    }

    #[test]
    fn closed_channel_keeps_the_text() {
        let mut binder = binder(RecordingChannel { closed: true, ..Default::default() });
        binder.input_mut().set_value("lost?");

        assert_eq!(binder.send_current_message(), SendOutcome::Failed);
        assert_eq!(binder.input().value(), "lost?");
    }

    #[test]
    fn inbound_message_appends_one_line() {
        let mut binder = binder(RecordingChannel::default());
        binder.on_inbound_message(msg("A", "hi", "12:00"));

        let children = binder.display().children();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].to_string(), "A: hi (12:00)");
    }

    #[test]
    fn lines_keep_arrival_order_and_stay_scrolled_to_bottom() {
        let mut binder = binder(RecordingChannel::default());

        for n in 0..10 {
            binder.on_inbound_message(msg("bob", &format!("line {n}"), "08:15"));
            let display = binder.display();
            assert_eq!(display.scroll_top(), display.max_scroll_top());
        }

        let bodies: Vec<_> = binder
            .display()
            .children()
            .iter()
            .map(|line| line.message.clone())
            .collect();
        let expected: Vec<_> = (0..10).map(|n| format!("line {n}")).collect();
        assert_eq!(bodies, expected);
        assert_eq!(binder.display().scroll_top(), 6);
    }

    #[test]
    fn bind_fails_on_unknown_id() {
        let mut doc = Document::chat_page(DEFAULT_INPUT_ID, DEFAULT_DISPLAY_ID, 4);
        let result = ChatBinder::bind(RecordingChannel::default(), &mut doc, "missing", DEFAULT_DISPLAY_ID);
        assert_eq!(result.err(), Some(BinderError::MissingElement("missing".into())));
    }
}
