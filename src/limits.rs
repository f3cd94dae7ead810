//! Hard limits enforced at the request boundary.

/// Longest accepted request line, in bytes.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Longest accepted `userEmail` (RFC 5321 path limit).
pub const MAX_EMAIL_LEN: usize = 320;

/// Seconds between compaction checks of the record log.
pub const COMPACT_CHECK_INTERVAL_SECS: u64 = 30;

/// How long shutdown waits for in-flight connections.
pub const DRAIN_TIMEOUT_SECS: u64 = 10;
