//! Entropy sources.

use parking_lot::RwLock;

use crate::config::DEFAULT_ENTROPY_LOOKBACK;

/// A sequence of 32-byte values indexed by logical unit (block height).
pub trait EntropySource: Send + Sync {
    /// The unit currently being produced. Values exist only for earlier units.
    fn current_unit(&self) -> u64;

    /// The value of `unit`, if it has been produced and is still retained.
    fn value_at(&self, unit: u64) -> Option<[u8; 32]>;
}

/// An in-memory hash chain standing in for a block producer.
///
/// Unit `n` is `BLAKE3(value(n-1) || n)`, with unit 0 derived from a seed.
/// Like a chain that only serves recent block hashes, values older than
/// `lookback` units are no longer returned.
#[derive(Debug)]
pub struct LocalBeacon {
    values: RwLock<Vec<[u8; 32]>>,
    lookback: u64,
}

impl LocalBeacon {
    pub fn new(seed: &[u8]) -> Self {
        Self::with_lookback(seed, DEFAULT_ENTROPY_LOOKBACK)
    }

    pub fn with_lookback(seed: &[u8], lookback: u64) -> Self {
        Self {
            values: RwLock::new(vec![*blake3::hash(seed).as_bytes()]),
            lookback,
        }
    }

    /// Produces `units` more values.
    pub fn advance(&self, units: u64) {
        let mut values = self.values.write();
        for _ in 0..units {
            let height = values.len() as u64;
            let prev = values.last().copied().unwrap_or([0u8; 32]);
            let mut hasher = blake3::Hasher::new();
            hasher.update(&prev);
            hasher.update(&height.to_be_bytes());
            values.push(*hasher.finalize().as_bytes());
        }
    }

    pub fn lookback(&self) -> u64 {
        self.lookback
    }
}

impl EntropySource for LocalBeacon {
    fn current_unit(&self) -> u64 {
        self.values.read().len() as u64
    }

    fn value_at(&self, unit: u64) -> Option<[u8; 32]> {
        let values = self.values.read();
        let current = values.len() as u64;
        if unit >= current || current - unit > self.lookback {
            return None;
        }
        values.get(usize::try_from(unit).ok()?).copied()
    }
}
