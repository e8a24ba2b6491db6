//! PIN hashing
//!
//! Hub firmware publishes the PIN as a 32-bit string hash rather than the
//! digits themselves. The hash is the classic `h = h * 31 + c` over UTF-16
//! code units with 32-bit wrap-around, so the same digits hash identically on
//! the device and in this client. It is an informational gate, not a
//! credential.

/// Deterministic 32-bit string hash shared with the device firmware
pub fn string_hash(input: &str) -> i32 {
    input
        .encode_utf16()
        .fold(0i32, |hash, unit| {
            hash.wrapping_shl(5)
                .wrapping_sub(hash)
                .wrapping_add(i32::from(unit))
        })
}

/// Whether the entered digits satisfy a stored PIN hash
///
/// A stored hash of 0 means "no PIN" and never matches, callers are expected
/// to skip the gate for such devices.
pub fn pin_matches(entered: &str, stored: i64) -> bool {
    stored != 0 && i64::from(string_hash(entered)) == stored
}

/// Hub identifier derived from a launch timestamp, as lowercase hex
pub fn hub_id_from_millis(millis: i64) -> String {
    format!("{:x}", string_hash(&millis.to_string()) as u32)
}
