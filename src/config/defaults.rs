//! Default value functions for configuration fields.
//!
//! All defaults used by serde's `#[serde(default = ...)]` attributes live
//! here, grouped by category.

use super::logging::LogFormat;

// =============================================================================
// Game rule defaults (per-room)
// =============================================================================

pub const fn default_day_phase_seconds() -> u64 {
    300
}

pub const fn default_night_phase_seconds() -> u64 {
    120
}

pub const fn default_voting_seconds() -> u64 {
    60
}

pub const fn default_werewolf_count() -> u8 {
    2
}

// =============================================================================
// Room lifecycle defaults
// =============================================================================

/// Interval between lifecycle cleaner passes (seconds).
pub const fn default_cleanup_interval() -> u64 {
    120
}

/// Idle time after which a waiting room is abandoned (seconds).
pub const fn default_inactivity_timeout() -> u64 {
    1200 // 20 minutes
}

/// Lead time before abandonment at which the warning fires (seconds).
pub const fn default_warning_window() -> u64 {
    300 // 5 minutes
}

/// Age after which a waiting room is abandoned regardless of activity (seconds).
pub const fn default_absolute_timeout() -> u64 {
    3600 // 1 hour
}

/// Retention for abandoned rooms before deletion (seconds).
pub const fn default_abandoned_retention() -> u64 {
    86_400 // 24 hours
}

/// Retention for finished rooms before deletion (seconds).
pub const fn default_finished_retention() -> u64 {
    604_800 // 7 days
}

// =============================================================================
// Scheduler defaults
// =============================================================================

/// Interval between `timer` sync broadcasts during a phase (seconds).
pub const fn default_timer_sync_interval() -> u64 {
    15
}

// =============================================================================
// Logging defaults
// =============================================================================

pub fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn default_log_filename() -> String {
    "server.log".to_string()
}

pub fn default_rotation() -> String {
    "daily".to_string()
}

pub const fn default_enable_file_logging() -> bool {
    false
}

pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
