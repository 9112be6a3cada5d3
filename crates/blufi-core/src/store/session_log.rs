// ── Session log ──
//
// Append-only progress log plus the two side-channel values derived from
// peer text: the device UID (first accepted value wins) and the
// "peer released the link" flag. A link-down only counts as a release
// once the link has been confirmed up.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::sync::watch;

use crate::model::{LogEntry, LogLevel, LogSource};

type Entries = Arc<Vec<Arc<LogEntry>>>;

pub struct SessionLog {
    entries: watch::Sender<Entries>,
    uid: watch::Sender<Option<String>>,
    released: watch::Sender<bool>,
    link_up: AtomicBool,
}

impl SessionLog {
    pub(crate) fn new() -> Self {
        let (entries, _) = watch::channel(Arc::new(Vec::new()));
        let (uid, _) = watch::channel(None);
        let (released, _) = watch::channel(false);
        Self {
            entries,
            uid,
            released,
            link_up: AtomicBool::new(false),
        }
    }

    /// Append an entry and return its sequence number.
    pub(crate) fn append(&self, level: LogLevel, source: LogSource, message: impl Into<String>) -> u64 {
        let message = message.into();
        let mut seq = 0;
        self.entries.send_modify(|entries| {
            let entries = Arc::make_mut(entries);
            seq = entries.last().map_or(0, |e| e.seq + 1);
            entries.push(Arc::new(LogEntry {
                seq,
                at: Utc::now(),
                level,
                source,
                message,
            }));
        });
        seq
    }

    /// Offer an extracted UID. Only the first offer per session is kept.
    pub(crate) fn offer_uid(&self, uid: &str) -> bool {
        self.uid.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(uid.to_owned());
            true
        })
    }

    /// A connect attempt is starting; link-down reports until the next
    /// link-up belong to the attempt, not to an established link.
    pub(crate) fn link_opening(&self) {
        self.link_up.store(false, Ordering::Release);
    }

    pub(crate) fn mark_link_up(&self) {
        self.link_up.store(true, Ordering::Release);
    }

    /// Record a link-down. Returns whether it released an established link.
    pub(crate) fn mark_released(&self) -> bool {
        if !self.link_up.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.released.send_if_modified(|released| !std::mem::replace(released, true));
        true
    }

    /// Clear everything for a fresh session.
    pub(crate) fn reset(&self) {
        self.entries.send_replace(Arc::new(Vec::new()));
        self.uid.send_replace(None);
        self.released.send_replace(false);
        self.link_up.store(false, Ordering::Release);
    }

    // ── Reads ────────────────────────────────────────────────────

    pub fn snapshot(&self) -> Entries {
        self.entries.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Entries> {
        self.entries.subscribe()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn uid(&self) -> Option<String> {
        self.uid.borrow().clone()
    }

    /// Whether the peer has dropped the link on its own this session.
    pub fn released(&self) -> bool {
        *self.released.borrow()
    }

    pub fn subscribe_released(&self) -> watch::Receiver<bool> {
        self.released.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn entries_are_ordered_and_numbered() {
        let log = SessionLog::new();
        assert_eq!(log.append(LogLevel::Info, LogSource::Orchestrator, "one"), 0);
        assert_eq!(log.append(LogLevel::Info, LogSource::Peer, "two"), 1);

        let messages: Vec<_> = log.snapshot().iter().map(|e| e.message.clone()).collect();
        assert_eq!(messages, ["one", "two"]);
    }

    #[test]
    fn first_uid_wins_until_reset() {
        let log = SessionLog::new();
        assert!(log.offer_uid("9876543210"));
        assert!(!log.offer_uid("1234567890"));
        assert_eq!(log.uid().as_deref(), Some("9876543210"));

        log.reset();
        assert_eq!(log.uid(), None);
        assert!(log.offer_uid("1234567890"));
    }

    #[test]
    fn reset_clears_entries_and_release_flag() {
        let log = SessionLog::new();
        log.append(LogLevel::Error, LogSource::Orchestrator, "boom");
        log.mark_link_up();
        assert!(log.mark_released());
        assert!(!log.mark_released());
        assert!(log.released());

        log.reset();
        assert!(log.is_empty());
        assert!(!log.released());
        assert_eq!(log.append(LogLevel::Info, LogSource::Peer, "fresh"), 0);
    }

    #[test]
    fn link_down_while_opening_is_not_a_release() {
        let log = SessionLog::new();
        log.mark_link_up();
        log.link_opening();
        assert!(!log.mark_released());
        assert!(!log.released());

        log.mark_link_up();
        assert!(log.mark_released());
        assert!(log.released());
    }
}
