//! Shared configuration constants.

/// User agent string the launched browser presents, pinned to a recent
/// stable Chrome release rather than whatever chromiumoxide's default is.
///
/// Updated: 2025-01-29 to Chrome 132 (current stable)
/// Chrome releases new stable versions ~every 4 weeks; revisit quarterly.
///
/// Reference: https://chromiumdash.appspot.com/schedule
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

/// Default per-call tool deadline, per the envelope contract.
pub const DEFAULT_TOOL_DEADLINE_SECS: u64 = 30;

/// Default HTTP dispatcher port.
pub const DEFAULT_HTTP_PORT: u16 = 8090;
