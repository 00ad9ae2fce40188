use bitcoin::{Transaction, Txid};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Thread-safe cache of previous transactions, avoiding repeat provider calls
///
/// Transactions are immutable once mined or relayed, so entries never expire.
#[derive(Clone, Default)]
pub struct TransactionCache {
    inner: Arc<Mutex<CacheInner>>,
}

#[derive(Default)]
struct CacheInner {
    transactions: HashMap<Txid, Transaction>,
    hits: u64,
    misses: u64,
}

impl TransactionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        // a panicked holder cannot leave a half-written entry behind
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get a transaction from cache if it exists
    pub fn get(&self, txid: &Txid) -> Option<Transaction> {
        let mut inner = self.lock();
        match inner.transactions.get(txid).cloned() {
            Some(transaction) => {
                inner.hits += 1;
                debug!("Cache hit for transaction: {}", txid);
                Some(transaction)
            }
            None => {
                inner.misses += 1;
                debug!("Cache miss for transaction: {}", txid);
                None
            }
        }
    }

    pub fn put(&self, transaction: Transaction) {
        let txid = transaction.compute_txid();
        self.lock().transactions.insert(txid, transaction);
        debug!("Cached transaction: {}", txid);
    }

    pub fn get_stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            entries: inner.transactions.len(),
        }
    }
}

/// Cache performance statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            (self.hits as f64 / (self.hits + self.misses) as f64) * 100.0
        }
    }
}
