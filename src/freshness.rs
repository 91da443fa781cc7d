//! Freshness resolution — time sensitivity and best-before timestamps.
//!
//! Pure functions over (candidate fields, freshness config, now). Used both
//! at save time (quarantine pre-expired items) and during validation.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Freshness section of the rule configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessConfig {
    pub enabled: bool,
    pub default_shelf_life_days: i64,
    pub min_shelf_life_days: i64,
    pub max_shelf_life_days: i64,
    /// Age groups whose questions are treated as time-sensitive even when
    /// the provider did not flag them.
    pub auto_time_sensitive_age_groups: Vec<String>,
    /// Free-text guidance forwarded to provider prompts.
    pub guidance: String,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_shelf_life_days: 365,
            min_shelf_life_days: 30,
            max_shelf_life_days: 1825,
            auto_time_sensitive_age_groups: vec!["youth".to_string()],
            guidance: String::new(),
        }
    }
}

/// Resolved freshness fields attached to a persisted question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessFields {
    pub time_sensitive: bool,
    /// Epoch milliseconds; `None` when not time-sensitive.
    pub best_before_at: Option<i64>,
    /// `YYYY-MM-DD` rendering of `best_before_at`.
    pub best_before_date: Option<String>,
}

/// Inputs the resolver needs from a candidate or persisted item.
#[derive(Debug, Clone, Default)]
pub struct FreshnessInput {
    pub time_sensitive: Option<bool>,
    /// Provider-declared date string (`YYYY-MM-DD`), if any.
    pub best_before_date: Option<String>,
    /// Already-resolved timestamp, if re-resolving a persisted item.
    pub best_before_at: Option<i64>,
    pub age_groups: Vec<String>,
}

/// Compute time sensitivity and the (clamped) best-before timestamp.
///
/// Disabled config always yields "not time-sensitive". Otherwise an item is
/// time-sensitive if explicitly flagged, if any best-before value is present,
/// or if one of its age groups is in `auto_time_sensitive_age_groups`. A
/// time-sensitive item with no explicit date defaults to
/// `now + default_shelf_life_days`; the result is clamped into
/// `[now + min_shelf_life_days, now + max_shelf_life_days]`.
pub fn resolve(input: &FreshnessInput, config: &FreshnessConfig, now: i64) -> FreshnessFields {
    if !config.enabled {
        return FreshnessFields::default();
    }

    let mut best_before_at = input
        .best_before_at
        .or_else(|| input.best_before_date.as_deref().and_then(parse_date_ms));

    let mut time_sensitive = input.time_sensitive.unwrap_or(false);
    if best_before_at.is_some() {
        time_sensitive = true;
    }

    if !time_sensitive && !config.auto_time_sensitive_age_groups.is_empty() {
        let auto: Vec<String> = config
            .auto_time_sensitive_age_groups
            .iter()
            .map(|g| g.to_lowercase())
            .collect();
        if input
            .age_groups
            .iter()
            .any(|g| auto.contains(&g.to_lowercase()))
        {
            time_sensitive = true;
        }
    }

    if time_sensitive && best_before_at.is_none() && config.default_shelf_life_days > 0 {
        best_before_at = Some(now + config.default_shelf_life_days * DAY_MS);
    }

    if let Some(at) = best_before_at.as_mut() {
        if config.min_shelf_life_days > 0 {
            let min_at = now + config.min_shelf_life_days * DAY_MS;
            if *at < min_at {
                *at = min_at;
            }
        }
        if config.max_shelf_life_days > 0 {
            let max_at = now + config.max_shelf_life_days * DAY_MS;
            if *at > max_at {
                *at = max_at;
            }
        }
    }

    FreshnessFields {
        time_sensitive,
        best_before_at,
        best_before_date: best_before_at.and_then(format_date),
    }
}

/// An item is expired iff it has a best-before timestamp at or before `now`.
pub fn is_expired(best_before_at: Option<i64>, now: i64) -> bool {
    matches!(best_before_at, Some(at) if at <= now)
}

fn parse_date_ms(value: &str) -> Option<i64> {
    let date = chrono::NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()?;
    let dt = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&dt).timestamp_millis())
}

fn format_date(ms: i64) -> Option<String> {
    let dt = Utc.timestamp_millis_opt(ms).single()?;
    Some(dt.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    fn config() -> FreshnessConfig {
        FreshnessConfig::default()
    }

    #[test]
    fn disabled_config_is_never_time_sensitive() {
        let cfg = FreshnessConfig {
            enabled: false,
            ..config()
        };
        let input = FreshnessInput {
            time_sensitive: Some(true),
            best_before_date: Some("2030-01-01".into()),
            ..Default::default()
        };
        let fields = resolve(&input, &cfg, NOW);
        assert!(!fields.time_sensitive);
        assert!(fields.best_before_at.is_none());
    }

    #[test]
    fn flagged_item_defaults_to_shelf_life() {
        let input = FreshnessInput {
            time_sensitive: Some(true),
            ..Default::default()
        };
        let fields = resolve(&input, &config(), NOW);
        assert!(fields.time_sensitive);
        assert_eq!(fields.best_before_at, Some(NOW + 365 * DAY_MS));
        assert!(fields.best_before_date.is_some());
    }

    #[test]
    fn best_before_implies_time_sensitive() {
        let input = FreshnessInput {
            best_before_date: Some("2031-06-15".into()),
            ..Default::default()
        };
        let fields = resolve(&input, &config(), NOW);
        assert!(fields.time_sensitive);
    }

    #[test]
    fn auto_age_group_forces_time_sensitive() {
        let input = FreshnessInput {
            age_groups: vec!["Youth".into()],
            ..Default::default()
        };
        let fields = resolve(&input, &config(), NOW);
        assert!(fields.time_sensitive, "youth is auto time-sensitive");

        let adult = FreshnessInput {
            age_groups: vec!["adults".into()],
            ..Default::default()
        };
        assert!(!resolve(&adult, &config(), NOW).time_sensitive);
    }

    #[test]
    fn best_before_is_clamped_into_shelf_life_window() {
        // A date in the past clamps up to min shelf life.
        let input = FreshnessInput {
            time_sensitive: Some(true),
            best_before_at: Some(NOW - DAY_MS),
            ..Default::default()
        };
        let fields = resolve(&input, &config(), NOW);
        assert_eq!(fields.best_before_at, Some(NOW + 30 * DAY_MS));

        // A date far in the future clamps down to max shelf life.
        let input = FreshnessInput {
            time_sensitive: Some(true),
            best_before_at: Some(NOW + 10_000 * DAY_MS),
            ..Default::default()
        };
        let fields = resolve(&input, &config(), NOW);
        assert_eq!(fields.best_before_at, Some(NOW + 1825 * DAY_MS));
    }

    #[test]
    fn expiry_semantics() {
        assert!(!is_expired(None, NOW));
        assert!(is_expired(Some(NOW), NOW));
        assert!(is_expired(Some(NOW - 1), NOW));
        assert!(!is_expired(Some(NOW + 1), NOW));
    }
}
