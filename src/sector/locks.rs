//! per-key critical sections

use std::collections::HashSet;
use std::sync::{Condvar, Mutex};

use anyhow::{anyhow, Result};

/// a set of named critical sections, unrelated keys never block each other
#[derive(Default)]
pub struct KeyedLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

/// releases the key on drop
pub struct KeyGuard<'a> {
    locks: &'a KeyedLocks,
    key: String,
}

impl KeyedLocks {
    /// blocks until the key is available
    pub fn lock(&self, key: impl Into<String>) -> Result<KeyGuard<'_>> {
        let key = key.into();
        let mut held = self
            .held
            .lock()
            .map_err(|_| anyhow!("keyed locks poisoned"))?;

        while held.contains(&key) {
            held = self
                .released
                .wait(held)
                .map_err(|_| anyhow!("keyed locks poisoned"))?;
        }

        held.insert(key.clone());
        Ok(KeyGuard { locks: self, key })
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        // recover from poisoning, the set itself stays consistent
        let mut held = match self.locks.held.lock() {
            Ok(held) => held,
            Err(poisoned) => poisoned.into_inner(),
        };

        held.remove(&self.key);
        drop(held);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::KeyedLocks;

    #[test]
    fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::default());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                thread::spawn(move || {
                    let _guard = locks.lock("s-t01000-1").unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unrelated_keys() {
        let locks = KeyedLocks::default();
        let _a = locks.lock("a").unwrap();
        let _b = locks.lock("b").unwrap();
        drop(_a);
        let _a2 = locks.lock("a").unwrap();
    }
}
