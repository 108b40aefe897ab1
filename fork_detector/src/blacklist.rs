use containers::Hash;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Hashes of headers that must not be accepted again for a while.
#[derive(Debug)]
pub struct BlackList {
    ttl: Duration,
    entries: Mutex<HashMap<Hash, Instant>>,
}

impl BlackList {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn add(&self, hash: Hash) {
        self.entries.lock().insert(hash, Instant::now() + self.ttl);
    }

    pub fn has(&self, hash: &Hash) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(hash) {
            Some(expires) if *expires > Instant::now() => true,
            Some(_) => {
                entries.remove(hash);
                false
            }
            None => false,
        }
    }

    /// Drop expired entries.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.entries.lock().retain(|_, expires| *expires > now);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
