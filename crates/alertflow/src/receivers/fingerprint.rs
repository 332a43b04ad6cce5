use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

const FINGERPRINT_LEN: usize = 16;

fn truncated_hex(hasher: Sha256) -> String {
    let mut digest = format!("{:x}", hasher.finalize());
    digest.truncate(FINGERPRINT_LEN);
    digest
}

/// Fingerprint over an ordered list of identifying parts. Order matters.
pub fn fingerprint_parts(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    truncated_hex(hasher)
}

/// Fingerprint over a label set, independent of map iteration order.
pub fn fingerprint_labels(labels: &HashMap<String, String>) -> String {
    let sorted: BTreeMap<_, _> = labels.iter().collect();

    let mut hasher = Sha256::new();
    for (key, value) in sorted {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b",");
    }
    truncated_hex(hasher)
}
