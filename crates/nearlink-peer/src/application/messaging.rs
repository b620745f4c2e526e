//! Messaging use-case: turns link events into a presentable conversation.
//!
//! The link layer surfaces opaque byte chunks; this module decodes them
//! best-effort as text and keeps an in-memory log plus the current link
//! status for whatever presentation sits on top (the bundled binary just
//! prints entries as they arrive).
//!
//! One received chunk becomes one log entry.  Because the link carries no
//! framing, a long message may arrive as several entries and two quick
//! messages may arrive glued together; the log reflects what the transport
//! delivered, not what the sender intended.

use nearlink_core::payload;

use crate::infrastructure::link::LinkEvent;

/// Where the link currently stands, from the presentation's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// No session and no attempt in flight.
    Idle,
    /// An outbound attempt is in progress.
    Connecting,
    /// A session is established; messages flow.
    Connected,
    /// The last session ended; nothing has replaced it yet.
    Ended,
}

/// Who produced a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// One displayable line of the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub direction: Direction,
    pub text: String,
}

/// In-memory conversation state driven by link events.
pub struct ConversationLog {
    status: LinkStatus,
    entries: Vec<LogEntry>,
}

impl Default for ConversationLog {
    fn default() -> Self {
        Self {
            status: LinkStatus::Idle,
            entries: Vec::new(),
        }
    }
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current link status.
    pub fn status(&self) -> LinkStatus {
        self.status
    }

    /// Every entry recorded so far, oldest first.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Applies one link event.  Returns the new entry if the event carried
    /// a payload, so callers can display it without re-scanning the log.
    pub fn apply(&mut self, event: &LinkEvent) -> Option<&LogEntry> {
        match event {
            LinkEvent::ConnectingStarted { .. } => {
                self.status = LinkStatus::Connecting;
                None
            }
            LinkEvent::Connected { .. } => {
                self.status = LinkStatus::Connected;
                None
            }
            LinkEvent::SessionEnded => {
                self.status = LinkStatus::Ended;
                None
            }
            LinkEvent::Inbound(bytes) => {
                self.entries.push(LogEntry {
                    direction: Direction::Inbound,
                    text: payload::decode_text(bytes),
                });
                self.entries.last()
            }
        }
    }

    /// Records a message this peer sent.
    pub fn record_outbound(&mut self, text: &str) {
        self.entries.push(LogEntry {
            direction: Direction::Outbound,
            text: text.to_string(),
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
