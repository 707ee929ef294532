//! Client configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

/// Placeholder shown for min/max statistics until a story has ended.
pub const STAT_PLACEHOLDER: &str = "-";

/// Capacity of the room change broadcast channel.
///
/// A lagging observer only misses intermediate versions; the next change it
/// does receive carries the latest version number.
pub const DEFAULT_CHANGE_CAPACITY: usize = 64;

/// Log filter used when neither `RUST_LOG` nor the config file sets one.
pub const DEFAULT_LOG_FILTER: &str = "info";
