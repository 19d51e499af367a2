//! FIFO of lines that arrived outside any command exchange.

use std::collections::VecDeque;

/// Unsolicited line queue owned by the driver.
///
/// Only two operations exist: enqueue one line, and take everything.
/// When a capacity is set the oldest lines are dropped on overflow.
#[derive(Debug, Default)]
pub struct UnsolicitedBuffer {
    lines: VecDeque<String>,
    capacity: Option<usize>,
    dropped: u64,
}

impl UnsolicitedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bounded(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity: Some(capacity.max(1)),
            dropped: 0,
        }
    }

    pub fn enqueue(&mut self, line: String) {
        if let Some(cap) = self.capacity {
            if self.lines.len() >= cap {
                self.lines.pop_front();
                self.dropped += 1;
                log::warn!("unsolicited buffer full ({}), dropped oldest line", cap);
            }
        }
        self.lines.push_back(line);
    }

    /// Remove and return every buffered line in arrival order.
    pub fn drain_all(&mut self) -> Vec<String> {
        self.lines.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_all_is_destructive_and_ordered() {
        let mut buf = UnsolicitedBuffer::new();
        buf.enqueue("+CMTI: \"SM\",1".into());
        buf.enqueue("+CMTI: \"SM\",2".into());
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.drain_all(), vec!["+CMTI: \"SM\",1", "+CMTI: \"SM\",2"]);
        assert!(buf.is_empty());
        assert!(buf.drain_all().is_empty());
    }

    #[test]
    fn bounded_buffer_drops_oldest() {
        let mut buf = UnsolicitedBuffer::bounded(2);
        for l in ["a", "b", "c"] {
            buf.enqueue(l.to_string());
        }
        assert_eq!(buf.dropped(), 1);
        assert_eq!(buf.drain_all(), vec!["b", "c"]);
    }
}
