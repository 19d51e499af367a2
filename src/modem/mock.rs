//! Scripted in-memory modem used by tests and dry runs.
//!
//! [`MockModem`] is both the script handle and a [`Connect`]
//! implementation. Every transport it hands out shares the same state, so a
//! test can keep the handle, give a clone to the driver, and inspect what
//! was written afterwards.
//!
//! Replies are keyed on the exact text written, with the trailing `\r`
//! removed (a message body keeps its trailing `\u{1a}`).

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::transport::{decode_line, Connect, Transport};

#[derive(Debug, Default)]
struct MockState {
    incoming: VecDeque<String>,
    once: HashMap<String, VecDeque<Vec<String>>>,
    always: HashMap<String, Vec<String>>,
    written: Vec<String>,
    failing_reads: u32,
    failing_writes: u32,
    refuse_connect: bool,
    connects: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MockModem {
    state: Arc<Mutex<MockState>>,
}

impl MockModem {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    /// Reply once with `lines` the next time `written` is sent.
    pub fn reply(&self, written: &str, lines: &[&str]) -> &Self {
        self.state()
            .once
            .entry(written.to_string())
            .or_default()
            .push_back(lines.iter().map(|l| l.to_string()).collect());
        self
    }

    /// Reply with `lines` every time `written` is sent.
    pub fn reply_always(&self, written: &str, lines: &[&str]) -> &Self {
        self.state()
            .always
            .insert(written.to_string(), lines.iter().map(|l| l.to_string()).collect());
        self
    }

    /// Answer the startup sequence with `OK` the way a healthy modem does.
    pub fn with_healthy_init(self) -> Self {
        for cmd in super::commands::INIT_SEQUENCE {
            self.reply_always(cmd, &["OK"]);
        }
        self
    }

    /// Queue a line as if the modem emitted it on its own.
    pub fn push_unsolicited(&self, line: &str) {
        self.state().incoming.push_back(line.to_string());
    }

    pub fn fail_next_reads(&self, count: u32) {
        self.state().failing_reads = count;
    }

    pub fn fail_next_writes(&self, count: u32) {
        self.state().failing_writes = count;
    }

    pub fn refuse_connect(&self, refuse: bool) {
        self.state().refuse_connect = refuse;
    }

    /// Everything written so far, one entry per write.
    pub fn written(&self) -> Vec<String> {
        self.state().written.clone()
    }

    pub fn count_written(&self, written: &str) -> usize {
        self.state().written.iter().filter(|w| *w == written).count()
    }

    pub fn connects(&self) -> usize {
        self.state().connects
    }

    /// Lines queued but not yet read.
    pub fn pending(&self) -> usize {
        self.state().incoming.len()
    }
}

fn lock(state: &Arc<Mutex<MockState>>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Connect for MockModem {
    fn connect(&self) -> io::Result<Box<dyn Transport>> {
        let mut state = self.state();
        if state.refuse_connect {
            return Err(io::Error::new(io::ErrorKind::NotFound, "mock device absent"));
        }
        state.connects += 1;
        Ok(Box::new(MockTransport {
            state: self.state.clone(),
        }))
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

/// Transport half of [`MockModem`].
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl Transport for MockTransport {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = lock(&self.state);
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "injected write failure"));
        }
        let text = String::from_utf8_lossy(bytes);
        let key = text.trim_end_matches('\r').to_string();
        let reply = match state.once.get_mut(&key).and_then(|q| q.pop_front()) {
            Some(lines) => Some(lines),
            None => state.always.get(&key).cloned(),
        };
        if let Some(lines) = reply {
            state.incoming.extend(lines);
        }
        state.written.push(key);
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> io::Result<Option<String>> {
        {
            let mut state = lock(&self.state);
            if state.failing_reads > 0 {
                state.failing_reads -= 1;
                return Err(io::Error::new(io::ErrorKind::Other, "injected read failure"));
            }
            if let Some(line) = state.incoming.pop_front() {
                return Ok(Some(decode_line(line.as_bytes())));
            }
        }
        // Nothing queued: behave like a real read timing out.
        std::thread::sleep(timeout);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_once_then_always() {
        let mock = MockModem::new();
        mock.reply("AT", &["first"]).reply_always("AT", &["OK"]);
        let mut t = mock.connect().unwrap();
        t.write_bytes(b"AT\r").unwrap();
        assert_eq!(t.read_line(Duration::ZERO).unwrap().as_deref(), Some("first"));
        t.write_bytes(b"AT\r").unwrap();
        assert_eq!(t.read_line(Duration::ZERO).unwrap().as_deref(), Some("OK"));
        assert!(t.read_line(Duration::ZERO).unwrap().is_none());
        assert_eq!(mock.count_written("AT"), 2);
        assert_eq!(mock.connects(), 1);
    }

    #[test]
    fn injected_failures_and_refusal() {
        let mock = MockModem::new();
        mock.fail_next_reads(1);
        let mut t = mock.connect().unwrap();
        assert!(t.read_line(Duration::ZERO).is_err());
        assert!(t.read_line(Duration::ZERO).unwrap().is_none());
        mock.refuse_connect(true);
        assert!(mock.connect().is_err());
    }
}
