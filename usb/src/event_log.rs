use log::debug;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

// Live subscribers lagging further than this will miss lines, the snapshot is unaffected.
const BROADCAST_CAPACITY: usize = 64;

/// The append-only activity record shown to the user.
///
/// Appends come from both the foreground controller and the background reader, so the lines
/// sit behind a lock. When a capacity is set, the oldest lines are discarded to make room, the
/// order of what remains is never changed.
#[derive(Clone)]
pub struct EventLog {
    lines: Arc<Mutex<LogLines>>,
    sender: broadcast::Sender<String>,
}

struct LogLines {
    lines: VecDeque<String>,
    capacity: Option<usize>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    pub fn with_capacity(capacity: Option<usize>) -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            lines: Arc::new(Mutex::new(LogLines {
                lines: VecDeque::new(),
                capacity,
            })),
            sender,
        }
    }

    pub fn append(&self, line: impl Into<String>) {
        let line = line.into();
        debug!("{}", line);

        // Held across the broadcast, so subscribers see lines in append order.
        let mut log = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(capacity) = log.capacity {
            while log.lines.len() >= capacity.max(1) {
                log.lines.pop_front();
            }
        }
        log.lines.push_back(line.clone());

        // No subscribers is fine, the line is retained for the next snapshot.
        let _ = self.sender.send(line);
    }

    pub fn snapshot(&self) -> Vec<String> {
        let log = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        log.lines.iter().cloned().collect()
    }

    /// Lines appended after this call, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    pub fn len(&self) -> usize {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .lines
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_append_order() {
        let log = EventLog::new();
        log.append("first");
        log.append(String::from("second"));

        assert_eq!(log.snapshot(), vec!["first", "second"]);
    }

    #[test]
    fn capacity_drops_oldest_only() {
        let log = EventLog::with_capacity(Some(2));
        log.append("a");
        log.append("b");
        log.append("c");

        assert_eq!(log.snapshot(), vec!["b", "c"]);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn clones_share_lines() {
        let log = EventLog::new();
        let reader_side = log.clone();
        reader_side.append("Received: hi");

        assert_eq!(log.snapshot(), vec!["Received: hi"]);
    }

    #[test]
    fn subscribers_see_new_lines() {
        let log = EventLog::new();
        log.append("before");

        let mut receiver = log.subscribe();
        log.append("after");

        assert_eq!(receiver.try_recv().unwrap(), "after");
        assert!(receiver.try_recv().is_err());
    }
}
