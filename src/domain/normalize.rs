//! Normalization and one-way hashing for outbound user data

use sha2::{Digest, Sha256};

/// SHA-256 of the trimmed, lower-cased value, hex encoded
pub fn hash_value(value: &str) -> String {
    let normalized = value.trim().to_lowercase();
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// Strip everything but digits; 10-digit numbers get a leading "1" country code
pub fn normalize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 10 {
        format!("1{}", digits)
    } else {
        digits
    }
}
