//! Expiration inputs and checks.
//!
//! [`set_expiration_times`] resolves per-operation TTL and max idle values
//! against the map defaults and stamps them onto a record; [`has_expired`]
//! tells whether a record is past its deadline.

use serde::{Deserialize, Serialize};

use crate::config::MapConfig;
use crate::storage::record::{RecordMetadata, NO_EXPIRY};

/// Expiry configuration for a single write.
///
/// Controls time-to-live and maximum idle time for automatic expiration.
/// A value of 0 falls back to the map's default (which may itself be 0,
/// meaning the record never expires on that axis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExpiryPolicy {
    /// Time-to-live in milliseconds from the last update. 0 = map default.
    pub ttl_millis: u64,
    /// Maximum idle time in milliseconds since last access. 0 = map default.
    pub max_idle_millis: u64,
}

impl ExpiryPolicy {
    /// Use the map defaults for both inputs.
    pub const NONE: Self = Self {
        ttl_millis: 0,
        max_idle_millis: 0,
    };

    /// Expire `ttl_millis` after the last update.
    #[must_use]
    pub const fn ttl(ttl_millis: u64) -> Self {
        Self {
            ttl_millis,
            max_idle_millis: 0,
        }
    }

    /// Expire `max_idle_millis` after the last access.
    #[must_use]
    pub const fn max_idle(max_idle_millis: u64) -> Self {
        Self {
            ttl_millis: 0,
            max_idle_millis,
        }
    }
}

/// Reason a record expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryReason {
    /// The record has not expired.
    NotExpired,
    /// The record expired due to time-to-live.
    Ttl,
    /// The record expired due to exceeding the maximum idle time.
    MaxIdle,
}

/// Resolves the effective TTL and max idle for a write and recomputes the
/// record's expiration time from its current timestamps.
///
/// With `consider_map_config` unset, zero inputs mean "no expiry" instead of
/// falling back to the map defaults.
pub fn set_expiration_times(
    expiry: &ExpiryPolicy,
    metadata: &mut RecordMetadata,
    config: &MapConfig,
    consider_map_config: bool,
) {
    metadata.ttl_millis = pick(expiry.ttl_millis, config.default_ttl_millis, consider_map_config);
    metadata.max_idle_millis = pick(
        expiry.max_idle_millis,
        config.default_max_idle_millis,
        consider_map_config,
    );
    metadata.refresh_expiration_time();
}

fn pick(operation: u64, map_default: u64, consider_map_config: bool) -> u64 {
    if operation > 0 || !consider_map_config {
        operation
    } else {
        map_default
    }
}

/// Checks whether a record's deadline has been reached at `now`.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn has_expired(metadata: &RecordMetadata, now: i64) -> ExpiryReason {
    if metadata.expiration_time == NO_EXPIRY || now < metadata.expiration_time {
        return ExpiryReason::NotExpired;
    }

    let ttl_deadline = metadata
        .last_update_time
        .saturating_add(metadata.ttl_millis.min(i64::MAX as u64) as i64);
    if metadata.ttl_millis > 0 && now >= ttl_deadline {
        ExpiryReason::Ttl
    } else {
        ExpiryReason::MaxIdle
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn config(default_ttl_millis: u64, default_max_idle_millis: u64) -> MapConfig {
        MapConfig {
            default_ttl_millis,
            default_max_idle_millis,
            ..MapConfig::default()
        }
    }

    #[test]
    fn no_inputs_means_no_expiry() {
        let mut meta = RecordMetadata::new(1000);
        set_expiration_times(&ExpiryPolicy::NONE, &mut meta, &config(0, 0), true);
        assert_eq!(meta.expiration_time, NO_EXPIRY);
        assert_eq!(has_expired(&meta, i64::MAX - 1), ExpiryReason::NotExpired);
    }

    #[test]
    fn zero_input_falls_back_to_map_default() {
        let mut meta = RecordMetadata::new(1000);
        set_expiration_times(&ExpiryPolicy::NONE, &mut meta, &config(5000, 0), true);
        assert_eq!(meta.ttl_millis, 5000);
        assert_eq!(meta.expiration_time, 6000);
    }

    #[test]
    fn explicit_input_overrides_map_default() {
        let mut meta = RecordMetadata::new(1000);
        set_expiration_times(&ExpiryPolicy::ttl(200), &mut meta, &config(5000, 0), true);
        assert_eq!(meta.expiration_time, 1200);
    }

    #[test]
    fn map_default_ignored_when_not_considered() {
        let mut meta = RecordMetadata::new(1000);
        set_expiration_times(&ExpiryPolicy::NONE, &mut meta, &config(5000, 700), false);
        assert_eq!(meta.expiration_time, NO_EXPIRY);
    }

    #[test]
    fn reports_ttl_and_max_idle_reasons() {
        let mut ttl = RecordMetadata::new(1000);
        set_expiration_times(&ExpiryPolicy::ttl(100), &mut ttl, &config(0, 0), true);
        assert_eq!(has_expired(&ttl, 1099), ExpiryReason::NotExpired);
        assert_eq!(has_expired(&ttl, 1100), ExpiryReason::Ttl);

        let mut idle = RecordMetadata::new(1000);
        set_expiration_times(&ExpiryPolicy::max_idle(50), &mut idle, &config(0, 0), true);
        assert_eq!(has_expired(&idle, 1049), ExpiryReason::NotExpired);
        assert_eq!(has_expired(&idle, 1050), ExpiryReason::MaxIdle);
    }

    proptest! {
        /// The deadline is always recomputed from the latest update time.
        #[test]
        fn update_tracks_now_plus_ttl(
            created in 0_i64..1_000_000,
            delta in 0_i64..1_000_000,
            ttl in 1_u64..1_000_000,
        ) {
            let cfg = config(0, 0);
            let policy = ExpiryPolicy::ttl(ttl);
            let mut meta = RecordMetadata::new(created);
            set_expiration_times(&policy, &mut meta, &cfg, true);
            let first = meta.expiration_time;

            let now = created + delta;
            meta.on_update(now);
            set_expiration_times(&policy, &mut meta, &cfg, true);

            prop_assert_eq!(meta.expiration_time, now + i64::try_from(ttl).unwrap());
            prop_assert!(meta.expiration_time >= first);
        }
    }
}
