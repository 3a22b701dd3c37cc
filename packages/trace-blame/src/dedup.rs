//! Process-wide gate that admits each distinct failure once.

use std::collections::HashSet;
use std::fmt;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

/// SHA-256 over a failure's message followed by its raw trace text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(message: &str, trace: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(message.as_bytes());
        hasher.update(trace.as_bytes());
        Fingerprint(hasher.finalize().into())
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|byte| format!("{byte:02x}")).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Fingerprints of every failure admitted so far.
///
/// Both the log callback and the explicit reporting path share one registry,
/// so the same failure seen through either is only reported once.
#[derive(Debug, Default)]
pub struct DedupRegistry {
    seen: Mutex<HashSet<Fingerprint>>,
}

impl DedupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time `(message, trace)` is seen.
    pub fn try_admit(&self, message: &str, trace: &str) -> bool {
        self.admit_fingerprint(Fingerprint::of(message, trace))
    }

    pub fn admit_fingerprint(&self, fingerprint: Fingerprint) -> bool {
        let admitted = self.seen.lock().insert(fingerprint);
        if !admitted {
            log::debug!("Suppressing already reported failure {fingerprint}");
        }
        admitted
    }

    pub fn contains(&self, message: &str, trace: &str) -> bool {
        self.seen.lock().contains(&Fingerprint::of(message, trace))
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}
