//! Utility functions shared across the server
//!
//! - Wall-clock milliseconds for expirations and stream IDs
//! - Replication ID generation

use rand::Rng;

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Expirations are stored as absolute millisecond timestamps and stream ID
/// auto-generation takes its `ms` part from this clock.
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

/// Generate the 40-character lowercase-hex replication ID a master
/// advertises in `FULLRESYNC` and `INFO`.
pub fn generate_replication_id() -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..40)
        .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
        .collect()
}
