//! Clock helpers. Card timestamps are Unix epoch seconds.

/// Return the current time as seconds since Unix epoch.
///
/// A clock set before the epoch reads as zero.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Format seconds since epoch as an RFC 3339 string.
pub fn secs_to_rfc3339(secs: u64) -> String {
    chrono::DateTime::from_timestamp(secs as i64, 0)
        .unwrap_or_default()
        .to_rfc3339()
}
