use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// In-process memory cache with a per-entry TTL
///
/// Keys are derived strings (`quote_{symbol}`,
/// `history_{symbol}_{interval}`); values are small clonable
/// snapshots. Exclusively owned by the stocks service - nothing else
/// writes it. Uses the tokio clock so paused-time tests can cross the
/// TTL deterministically.
pub struct TtlCache<V> {
    entries: DashMap<String, (Instant, V)>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Get a live entry; expired entries are dropped on access
    pub fn get(&self, key: &str) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) => {
                let (inserted_at, value) = entry.value();
                if inserted_at.elapsed() < self.ttl {
                    return Some(value.clone());
                }
                true
            }
            None => false,
        };

        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: String, value: V) {
        self.entries.insert(key, (Instant::now(), value));
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Cache key for a quote entry
pub fn quote_key(symbol: &str) -> String {
    format!("quote_{symbol}")
}

/// Cache key for a history entry
pub fn history_key(symbol: &str, interval: &str) -> String {
    format!("history_{symbol}_{interval}")
}
