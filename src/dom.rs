use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::models::chat::ChatMessage;

pub const DEFAULT_INPUT_ID: &str = "chat-message";
pub const DEFAULT_DISPLAY_ID: &str = "chat-box";
pub const CHAT_LINE_CLASS: &str = "chat-message";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BinderError {
    #[error("no element with id '{0}' in document")]
    MissingElement(String),
}

/// A text field the user types into.
pub trait InputElement {
    fn id(&self) -> &str;
    fn value(&self) -> &str;
    fn set_value(&mut self, value: &str);
}

/// A scrolling container holding rendered chat lines.
pub trait DisplayContainer {
    fn id(&self) -> &str;
    fn append_child(&mut self, line: ChatLine);
    fn children(&self) -> &[ChatLine];
    fn scroll_height(&self) -> u32;
    fn client_height(&self) -> u32;
    fn scroll_top(&self) -> u32;
    fn set_scroll_top(&mut self, top: u32);

    fn max_scroll_top(&self) -> u32 {
        self.scroll_height().saturating_sub(self.client_height())
    }
}

/// Rendered form of one inbound chat message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatLine {
    pub username: String,
    pub message: String,
    pub time: String,
}

impl ChatLine {
    /// `<div class="chat-message"><strong>user:</strong> text <em>(time)</em></div>`, values escaped.
    pub fn to_html(&self) -> String {
        format!(
            "<div class=\"{}\"><strong>{}:</strong> {} <em>({})</em></div>",
            CHAT_LINE_CLASS,
            escape_html(&self.username),
            escape_html(&self.message),
            escape_html(&self.time)
        )
    }
}

impl From<ChatMessage> for ChatLine {
    fn from(msg: ChatMessage) -> Self {
        Self {
            username: msg.username,
            message: msg.message,
            time: msg.time,
        }
    }
}

impl fmt::Display for ChatLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.username, self.message, self.time)
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Clone, Debug, Default)]
pub struct TextInput {
    id: String,
    value: String,
}

impl TextInput {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string(), value: String::new() }
    }
}

impl InputElement for TextInput {
    fn id(&self) -> &str {
        &self.id
    }

    fn value(&self) -> &str {
        &self.value
    }

    fn set_value(&mut self, value: &str) {
        self.value = value.to_string();
    }
}

/// Display container measured in rows: every line is one row tall and the
/// viewport shows `viewport_rows` of them.
#[derive(Clone, Debug)]
pub struct ChatBox {
    id: String,
    lines: Vec<ChatLine>,
    viewport_rows: u32,
    scroll_top: u32,
}

impl ChatBox {
    pub fn new(id: &str, viewport_rows: u32) -> Self {
        Self {
            id: id.to_string(),
            lines: Vec::new(),
            viewport_rows,
            scroll_top: 0,
        }
    }

    /// Lines currently inside the viewport.
    pub fn visible(&self) -> &[ChatLine] {
        let start = (self.scroll_top as usize).min(self.lines.len());
        let end = (start + self.viewport_rows as usize).min(self.lines.len());
        &self.lines[start..end]
    }
}

impl DisplayContainer for ChatBox {
    fn id(&self) -> &str {
        &self.id
    }

    fn append_child(&mut self, line: ChatLine) {
        self.lines.push(line);
    }

    fn children(&self) -> &[ChatLine] {
        &self.lines
    }

    fn scroll_height(&self) -> u32 {
        u32::try_from(self.lines.len()).unwrap_or(u32::MAX)
    }

    fn client_height(&self) -> u32 {
        self.viewport_rows
    }

    fn scroll_top(&self) -> u32 {
        self.scroll_top
    }

    fn set_scroll_top(&mut self, top: u32) {
        // browsers clamp scrollTop the same way
        self.scroll_top = top.min(self.max_scroll_top());
    }
}

/// Elements of the chat page, keyed by id.
#[derive(Debug, Default)]
pub struct Document {
    inputs: HashMap<String, TextInput>,
    displays: HashMap<String, ChatBox>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// The page the chat binder expects: one input and one display container.
    pub fn chat_page(input_id: &str, display_id: &str, viewport_rows: u32) -> Self {
        let mut doc = Self::new();
        doc.insert_input(TextInput::new(input_id));
        doc.insert_display(ChatBox::new(display_id, viewport_rows));
        doc
    }

    pub fn insert_input(&mut self, input: TextInput) {
        self.inputs.insert(input.id().to_string(), input);
    }

    pub fn insert_display(&mut self, display: ChatBox) {
        self.displays.insert(display.id().to_string(), display);
    }

    pub fn take_input(&mut self, id: &str) -> Result<TextInput, BinderError> {
        self.inputs.remove(id).ok_or_else(|| BinderError::MissingElement(id.to_string()))
    }

    pub fn take_display(&mut self, id: &str) -> Result<ChatBox, BinderError> {
        self.displays.remove(id).ok_or_else(|| BinderError::MissingElement(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> ChatLine {
        ChatLine {
            username: format!("user{n}"),
            message: format!("message {n}"),
            time: "12:00".into(),
        }
    }

    #[test]
    fn text_form_keeps_display_order() {
        let line = ChatLine { username: "A".into(), message: "hi".into(), time: "12:00".into() };
        assert_eq!(line.to_string(), "A: hi (12:00)");
    }

    #[test]
    fn html_form_escapes_markup() {
        let line = ChatLine {
            username: "<b>mallory</b>".into(),
            message: "<script>alert('x')</script> & co".into(),
            time: "09:30".into(),
        };
        assert_eq!(
            line.to_html(),
            "<div class=\"chat-message\"><strong>&lt;b&gt;mallory&lt;/b&gt;:</strong> \
             &lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt; &amp; co <em>(09:30)</em></div>"
        );
    }

    #[test]
    fn scroll_top_is_clamped_to_extent() {
        let mut chat_box = ChatBox::new("chat-box", 3);
        chat_box.set_scroll_top(10);
        assert_eq!(chat_box.scroll_top(), 0);

        for n in 0..5 {
            chat_box.append_child(line(n));
        }
        assert_eq!(chat_box.max_scroll_top(), 2);
        chat_box.set_scroll_top(u32::MAX);
        assert_eq!(chat_box.scroll_top(), 2);

        let visible: Vec<_> = chat_box.visible().iter().map(|l| l.username.as_str()).collect();
        assert_eq!(visible, ["user2", "user3", "user4"]);
    }

    #[test]
    fn document_lookup_by_id() {
        let mut doc = Document::chat_page(DEFAULT_INPUT_ID, DEFAULT_DISPLAY_ID, 10);
        assert!(doc.take_input("chat-message").is_ok());
        assert_eq!(
            doc.take_input("chat-message").unwrap_err(),
            BinderError::MissingElement("chat-message".into())
        );
        assert!(doc.take_display("nope").is_err());
        assert_eq!(doc.take_display("chat-box").unwrap().client_height(), 10);
    }
}
