//! "Record added" listeners
//!
//! An engine-owned ordered list of named callbacks. Registering an existing
//! name replaces the callback in place, keeping its position.

use crate::types::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Callback invoked with each committed block and its index
pub type Listener = Box<dyn Fn(&Value, u64) + Send + Sync>;

/// Ordered `(name, callback)` registry
#[derive(Default)]
pub struct Listeners {
    entries: Vec<(String, Listener)>,
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl Listeners {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a listener. Returns `true` if an existing one was replaced.
    pub fn register(&mut self, name: impl Into<String>, listener: Listener) -> bool {
        let name = name.into();
        for entry in self.entries.iter_mut() {
            if entry.0 == name {
                entry.1 = listener;
                return true;
            }
        }
        self.entries.push((name, listener));
        false
    }

    /// Remove a listener by name
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| n != name);
        self.entries.len() != before
    }

    /// Registered names, in call order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Number of listeners
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No listeners registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Call every listener in order. Returns how many panicked.
    pub fn notify(&self, block: &Value, index: u64) -> u64 {
        let mut panics = 0;
        for (name, listener) in &self.entries {
            if catch_unwind(AssertUnwindSafe(|| listener(block, index))).is_err() {
                tracing::error!(listener = %name, index, "Listener panicked");
                panics += 1;
            }
        }
        panics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Listener {
        let log = log.clone();
        Box::new(move |_: &Value, index: u64| log.lock().push(format!("{}:{}", tag, index)))
    }

    #[test]
    fn test_called_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut listeners = Listeners::new();
        listeners.register("a", recorder(&log, "a"));
        listeners.register("b", recorder(&log, "b"));

        listeners.notify(&Value::Nat(0), 7);

        assert_eq!(*log.lock(), vec!["a:7".to_string(), "b:7".to_string()]);
    }

    #[test]
    fn test_register_same_name_replaces_in_place() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut listeners = Listeners::new();
        assert!(!listeners.register("a", recorder(&log, "old")));
        listeners.register("b", recorder(&log, "b"));
        assert!(listeners.register("a", recorder(&log, "new")));

        listeners.notify(&Value::Nat(0), 1);

        assert_eq!(listeners.names(), vec!["a", "b"]);
        assert_eq!(*log.lock(), vec!["new:1".to_string(), "b:1".to_string()]);
    }

    #[test]
    fn test_panicking_listener_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut listeners = Listeners::new();
        listeners.register("boom", Box::new(|_: &Value, _: u64| panic!("listener failure")));
        listeners.register("after", recorder(&log, "after"));

        assert_eq!(listeners.notify(&Value::Nat(0), 3), 1);
        assert_eq!(*log.lock(), vec!["after:3".to_string()]);
    }

    #[test]
    fn test_remove() {
        let mut listeners = Listeners::new();
        listeners.register("a", Box::new(|_: &Value, _: u64| {}));

        assert!(listeners.remove("a"));
        assert!(!listeners.remove("a"));
        assert!(listeners.is_empty());
    }
}
