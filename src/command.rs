use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};

/// Bytes the device-side parser treats as structure.
const RESERVED: [char; 5] = [',', ':', '\n', '\r', '\0'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub initial: i32,
    pub current: i32,
}

#[derive(Debug, Default)]
struct Entries {
    list: Vec<Command>,
    index: HashMap<String, usize>,
}

/// Named command values for one connection, kept in registration order.
///
/// All access goes through one lock, so a [`snapshot`](Self::snapshot) never
/// observes a half-applied update or reset.
#[derive(Debug, Default)]
pub struct CommandTable {
    entries: Mutex<Entries>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        // Entries are plain values; a panic elsewhere cannot leave them torn.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, name: &str, initial: i32) -> Result<()> {
        if name.is_empty() || name.contains(RESERVED) {
            return Err(Error::InvalidCommandName(name.to_string()));
        }
        let mut e = self.lock();
        if e.index.contains_key(name) {
            return Err(Error::DuplicateCommand(name.to_string()));
        }
        let slot = e.list.len();
        e.list.push(Command {
            name: name.to_string(),
            initial,
            current: initial,
        });
        e.index.insert(name.to_string(), slot);
        Ok(())
    }

    pub fn update(&self, name: &str, value: i32) -> Result<()> {
        let mut e = self.lock();
        let slot = *e
            .index
            .get(name)
            .ok_or_else(|| Error::UnknownCommand(name.to_string()))?;
        e.list[slot].current = value;
        Ok(())
    }

    /// Watchdog action: every command back to its initial value.
    pub fn reset_all(&self) {
        for c in self.lock().list.iter_mut() {
            c.current = c.initial;
        }
    }

    /// `(name, current)` pairs in registration order.
    pub fn snapshot(&self) -> Vec<(String, i32)> {
        self.lock()
            .list
            .iter()
            .map(|c| (c.name.clone(), c.current))
            .collect()
    }

    /// `(name, initial)` pairs in registration order.
    pub fn initial_snapshot(&self) -> Vec<(String, i32)> {
        self.lock()
            .list
            .iter()
            .map(|c| (c.name.clone(), c.initial))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Command> {
        let e = self.lock();
        e.index.get(name).map(|&slot| e.list[slot].clone())
    }

    pub fn value(&self, name: &str) -> Option<i32> {
        self.get(name).map(|c| c.current)
    }

    pub fn len(&self) -> usize {
        self.lock().list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table() -> CommandTable {
        let t = CommandTable::new();
        t.register("BLINK", 100).unwrap();
        t.register("SRV1", 90).unwrap();
        t.register("MTR1", 0).unwrap();
        t
    }

    #[test]
    fn snapshot_keeps_registration_order() {
        let t = table();
        assert_eq!(
            t.snapshot(),
            vec![
                ("BLINK".to_string(), 100),
                ("SRV1".to_string(), 90),
                ("MTR1".to_string(), 0),
            ]
        );
    }

    #[test]
    fn duplicate_registration_fails() {
        let t = table();
        assert!(matches!(
            t.register("SRV1", 5),
            Err(Error::DuplicateCommand(n)) if n == "SRV1"
        ));
        // first registration untouched
        assert_eq!(t.get("SRV1").unwrap().initial, 90);
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn update_touches_only_current_of_one_command() {
        let t = table();
        t.update("SRV1", 180).unwrap();
        let c = t.get("SRV1").unwrap();
        assert_eq!((c.initial, c.current), (90, 180));
        assert_eq!(t.value("BLINK"), Some(100));
        assert_eq!(t.value("MTR1"), Some(0));
    }

    #[test]
    fn update_unknown_fails() {
        let t = table();
        assert!(matches!(
            t.update("NOPE", 1),
            Err(Error::UnknownCommand(n)) if n == "NOPE"
        ));
    }

    #[test]
    fn reset_all_restores_initials() {
        let t = table();
        t.update("BLINK", 250).unwrap();
        t.update("MTR1", -25).unwrap();
        t.reset_all();
        assert_eq!(t.snapshot(), t.initial_snapshot());
    }

    #[test]
    fn rejects_names_that_break_framing() {
        let t = CommandTable::new();
        for bad in ["", "A,B", "A:B", "A\nB", "A\0"] {
            assert!(
                matches!(t.register(bad, 0), Err(Error::InvalidCommandName(_))),
                "{bad:?} accepted"
            );
        }
        assert!(t.is_empty());
    }
}
