use chrono::{DateTime, Utc};
use sha3::{Digest, Sha3_256};
use uuid::Uuid;

pub fn get_sha3_256_hash(data: &str) -> String {
    let mut hasher = Sha3_256::default();
    hasher.update(data);
    format!("{:X}", hasher.finalize())
}

/// Stored as `salt$digest`, digest over `salt || password`.
pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    let digest = get_sha3_256_hash(&format!("{salt}{password}"));
    format!("{salt}${digest}")
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, digest)) => {
            let candidate = get_sha3_256_hash(&format!("{salt}{password}"));
            constant_time_eq(candidate.as_bytes(), digest.as_bytes())
        }
        None => false,
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Gateway transaction reference for one payment attempt.
pub fn transaction_reference(abstract_id: i64, at: DateTime<Utc>) -> String {
    format!("ABS-{}-{}", abstract_id, at.timestamp_millis())
}
