//! Client-side conversation bookkeeping: unread counters and reply quoting.

use std::collections::HashMap;

/// Unread message counts per contact.
///
/// Messages from the contact whose chat is currently open are read on
/// arrival and never counted.
#[derive(Debug, Default)]
pub struct Inbox {
    unread: HashMap<String, usize>,
    open_chat: Option<String>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an incoming message from `from`. Returns `true` if it was
    /// counted as unread.
    pub fn record_incoming(&mut self, from: &str) -> bool {
        if self.open_chat.as_deref() == Some(from) {
            return false;
        }
        *self.unread.entry(from.to_string()).or_insert(0) += 1;
        true
    }

    /// Make `contact` the open chat and mark its messages read.
    pub fn open_chat(&mut self, contact: &str) {
        self.unread.remove(contact);
        self.open_chat = Some(contact.to_string());
    }

    pub fn close_chat(&mut self) {
        self.open_chat = None;
    }

    pub fn current_chat(&self) -> Option<&str> {
        self.open_chat.as_deref()
    }

    pub fn unread(&self, contact: &str) -> usize {
        self.unread.get(contact).copied().unwrap_or(0)
    }

    pub fn total_unread(&self) -> usize {
        self.unread.values().sum()
    }
}

/// Prefix `reply` with a quote of the message it answers.
pub fn quote_reply(original: &str, reply: &str) -> String {
    format!("> Replying to: \"{original}\"\n\n{reply}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_messages_outside_open_chat() {
        let mut inbox = Inbox::new();
        inbox.open_chat("bob");

        assert!(!inbox.record_incoming("bob"));
        assert!(inbox.record_incoming("carol"));
        assert!(inbox.record_incoming("carol"));
        assert!(inbox.record_incoming("dave"));

        assert_eq!(inbox.unread("bob"), 0);
        assert_eq!(inbox.unread("carol"), 2);
        assert_eq!(inbox.total_unread(), 3);
    }

    #[test]
    fn opening_a_chat_clears_its_count() {
        let mut inbox = Inbox::new();
        inbox.record_incoming("carol");
        inbox.record_incoming("dave");

        inbox.open_chat("carol");
        assert_eq!(inbox.current_chat(), Some("carol"));
        assert_eq!(inbox.unread("carol"), 0);
        assert_eq!(inbox.total_unread(), 1);

        inbox.close_chat();
        assert!(inbox.record_incoming("carol"));
        assert_eq!(inbox.unread("carol"), 1);
    }

    #[test]
    fn quote_reply_format() {
        assert_eq!(
            quote_reply("lunch?", "sure"),
            "> Replying to: \"lunch?\"\n\nsure"
        );
    }
}
