use crossbeam_channel::Sender;
use std::collections::HashMap;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::debug;

use crate::scheduler::core::SessionSink;

/// Live end of one playing connection.
#[derive(Debug)]
pub struct SessionHandle {
    name: String,
    outbound: Sender<Vec<u8>>,
    stream: Mutex<Option<TcpStream>>,
    closed: AtomicBool,
}

impl SessionHandle {
    pub fn new(name: &str, outbound: Sender<Vec<u8>>, stream: Option<TcpStream>) -> Self {
        Self {
            name: name.to_string(),
            outbound,
            stream: Mutex::new(stream),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues text as-is, apart from bare `\n` becoming `\r\n`.
    pub fn send_text(&self, text: &str) -> bool {
        if self.is_closed() {
            return false;
        }
        self.outbound.send(normalize_newlines(text).into_bytes()).is_ok()
    }

    pub fn send_line(&self, text: &str) -> bool {
        self.send_text(&format!("{}\r\n", text))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Shuts the socket down so a blocked reader wakes up. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let stream = self
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(stream) = stream {
            if let Err(err) = stream.shutdown(Shutdown::Both) {
                debug!(name = %self.name, error = %err, "socket shutdown failed");
            }
        }
    }
}

pub fn normalize_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut previous = '\0';
    for ch in text.chars() {
        if ch == '\n' && previous != '\r' {
            out.push('\r');
        }
        out.push(ch);
        previous = ch;
    }
    out
}

/// Character/Session Registry: lowercase character name to session handle.
/// Read-mostly; writers only on login and logout.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails when a session for that name is already registered.
    pub fn register(&self, handle: Arc<SessionHandle>) -> bool {
        let key = handle.name().to_ascii_lowercase();
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if sessions.contains_key(&key) {
            return false;
        }
        sessions.insert(key, handle);
        true
    }

    /// Removes the entry only if it still belongs to `handle`.
    pub fn unregister(&self, handle: &Arc<SessionHandle>) -> bool {
        let key = handle.name().to_ascii_lowercase();
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match sessions.get(&key) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                sessions.remove(&key);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<SessionHandle>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    pub fn send_line(&self, name: &str, text: &str) -> bool {
        self.get(name).map_or(false, |handle| handle.send_line(text))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|handle| handle.name().to_string())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Force-closes every registered transport. Entries stay until their
    /// connection threads unregister them.
    pub fn close_all(&self) -> usize {
        let handles: Vec<Arc<SessionHandle>> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for handle in &handles {
            handle.close();
        }
        handles.len()
    }
}

impl SessionSink for SessionRegistry {
    fn deliver(&self, name: &str, text: &str) {
        if !self.send_line(name, text) {
            debug!(%name, "dropped output for a missing session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::Receiver;

    fn session(name: &str) -> (Arc<SessionHandle>, Receiver<Vec<u8>>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Arc::new(SessionHandle::new(name, tx, None)), rx)
    }

    #[test]
    fn names_are_unique_regardless_of_case() {
        let registry = SessionRegistry::new();
        let (bob, _rx) = session("Bob");
        let (other, _rx2) = session("BOB");
        assert!(registry.register(Arc::clone(&bob)));
        assert!(!registry.register(Arc::clone(&other)));
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.get("bob").unwrap(), &bob));
    }

    #[test]
    fn unregister_ignores_stale_handles() {
        let registry = SessionRegistry::new();
        let (bob, _rx) = session("Bob");
        let (stale, _rx2) = session("Bob");
        registry.register(Arc::clone(&bob));
        assert!(!registry.unregister(&stale));
        assert!(registry.unregister(&bob));
        assert!(registry.is_empty());
    }

    #[test]
    fn lines_reach_the_outbound_queue() {
        let registry = SessionRegistry::new();
        let (bob, rx) = session("Bob");
        registry.register(bob);
        assert!(registry.send_line("bob", "You are hungry.\nVery."));
        assert_eq!(rx.try_recv().unwrap(), b"You are hungry.\r\nVery.\r\n".to_vec());
        assert!(!registry.send_line("amy", "hello"));
    }

    #[test]
    fn closed_sessions_stop_accepting_output() {
        let registry = SessionRegistry::new();
        let (bob, rx) = session("Bob");
        let (amy, _rx2) = session("Amy");
        registry.register(Arc::clone(&bob));
        registry.register(amy);
        assert_eq!(registry.names(), vec!["Amy".to_string(), "Bob".to_string()]);
        assert_eq!(registry.close_all(), 2);
        assert!(bob.is_closed());
        assert!(!bob.send_line("anyone there?"));
        assert!(rx.try_recv().is_err());
        bob.close();
    }

    #[test]
    fn crlf_is_left_alone() {
        assert_eq!(normalize_newlines("a\r\nb\nc"), "a\r\nb\r\nc");
    }
}
