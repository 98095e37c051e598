//! Object identifiers: 24-character lowercase hexadecimal.
//!
//! The same token format is embedded in outbound subject lines
//! (`[Ref: <id>]`) and parsed back by the correlation engine, so the
//! two must stay in lock-step.

use std::fmt::Write;

use rand::RngCore;

/// Generate a new 24-hex identifier: 4 timestamp bytes + 8 random bytes.
///
/// The timestamp prefix keeps ids roughly creation-ordered, which makes
/// them pleasant to scan in logs. Ordering guarantees come from the
/// `created_at` column, never from the id.
pub fn new_object_id() -> String {
    let ts = chrono::Utc::now().timestamp() as u32;
    let mut tail = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut tail);

    let mut id = String::with_capacity(24);
    // Writing to a String cannot fail.
    let _ = write!(id, "{ts:08x}");
    for byte in tail {
        let _ = write!(id, "{byte:02x}");
    }
    id
}

/// Check whether a string is a well-formed object id.
pub fn is_object_id(s: &str) -> bool {
    s.len() == 24 && s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}
