//! Configuration types.
//!
//! Everything is read from environment variables (a `.env` file is loaded by
//! the binary first). The parsers take a lookup function so tests never touch
//! the process environment.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default directory API base URL.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Tuning for the tiered membership enumerator.
#[derive(Debug, Clone)]
pub struct EnumeratorConfig {
    /// Fraction of the declared group size a bulk fetch must reach to be accepted.
    pub sufficiency_ratio: f64,
    /// Number of supplemental paginated rounds after an insufficient bulk fetch.
    pub supplemental_rounds: u32,
    /// Page size for paginated requests.
    pub page_size: u32,
    /// Page ceiling for the strict cursor fallback.
    pub max_pages: u32,
    /// Delay after each supplemental round.
    pub supplemental_delay: Duration,
    /// Delay after each strict-fallback page.
    pub page_delay: Duration,
}

impl Default for EnumeratorConfig {
    fn default() -> Self {
        Self {
            sufficiency_ratio: 0.9,
            supplemental_rounds: 5,
            page_size: 1000,
            max_pages: 10,
            supplemental_delay: Duration::from_millis(1000),
            page_delay: Duration::from_millis(2000),
        }
    }
}

impl EnumeratorConfig {
    /// Configuration with every delay zeroed. Used by tests.
    pub fn without_delays() -> Self {
        Self {
            supplemental_delay: Duration::ZERO,
            page_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Outbound call spacing.
#[derive(Debug, Clone)]
pub struct PacingConfig {
    /// Minimum spacing between directory calls.
    pub request_spacing: Duration,
    /// Minimum spacing between notification deliveries.
    pub notify_spacing: Duration,
    /// Pause after each emitted notification before the next member.
    pub emit_pacing: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            request_spacing: Duration::from_millis(250),
            notify_spacing: Duration::from_millis(1500),
            emit_pacing: Duration::from_millis(1500),
        }
    }
}

impl PacingConfig {
    pub fn none() -> Self {
        Self {
            request_spacing: Duration::ZERO,
            notify_spacing: Duration::ZERO,
            emit_pacing: Duration::ZERO,
        }
    }
}

/// Full scanner configuration.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Directory credential, sent verbatim as the `Authorization` header.
    pub token: SecretString,
    /// Notification webhook endpoint.
    pub webhook_url: SecretString,
    /// Directory API base URL.
    pub api_base: String,
    pub enumerator: EnumeratorConfig,
    pub pacing: PacingConfig,
    /// Extra keyword patterns appended after the built-in keyword family.
    pub extra_keywords: Vec<String>,
    /// Interval between repeated passes. `None` runs a single pass.
    pub repeat_interval: Option<Duration>,
    /// Directory for rolling log files, if file logging is wanted.
    pub log_dir: Option<String>,
}

impl ScanConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = required(&lookup, "DISCORD_TOKEN")?;
        let webhook_url = required(&lookup, "WEBHOOK_URL")?;
        let api_base = lookup("DISCORD_API_BASE")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let defaults = EnumeratorConfig::default();
        let sufficiency_ratio: f64 =
            parse_or(&lookup, "SCAN_SUFFICIENCY_RATIO", defaults.sufficiency_ratio)?;
        if !(sufficiency_ratio > 0.0 && sufficiency_ratio <= 1.0) {
            return Err(ConfigError::InvalidValue {
                key: "SCAN_SUFFICIENCY_RATIO".into(),
                message: format!("{sufficiency_ratio} is outside (0, 1]"),
            });
        }

        let page_size: u32 = parse_or(&lookup, "SCAN_PAGE_SIZE", defaults.page_size)?;
        if page_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SCAN_PAGE_SIZE".into(),
                message: "must be at least 1".into(),
            });
        }

        let enumerator = EnumeratorConfig {
            sufficiency_ratio,
            supplemental_rounds: parse_or(
                &lookup,
                "SCAN_SUPPLEMENTAL_ROUNDS",
                defaults.supplemental_rounds,
            )?,
            page_size,
            max_pages: parse_or(&lookup, "SCAN_MAX_PAGES", defaults.max_pages)?,
            supplemental_delay: millis_or(
                &lookup,
                "SCAN_SUPPLEMENTAL_DELAY_MS",
                defaults.supplemental_delay,
            )?,
            page_delay: millis_or(&lookup, "SCAN_PAGE_DELAY_MS", defaults.page_delay)?,
        };

        let pacing_defaults = PacingConfig::default();
        let pacing = PacingConfig {
            request_spacing: millis_or(
                &lookup,
                "SCAN_REQUEST_SPACING_MS",
                pacing_defaults.request_spacing,
            )?,
            notify_spacing: millis_or(
                &lookup,
                "SCAN_NOTIFY_SPACING_MS",
                pacing_defaults.notify_spacing,
            )?,
            emit_pacing: millis_or(&lookup, "SCAN_EMIT_PACING_MS", pacing_defaults.emit_pacing)?,
        };

        let extra_keywords: Vec<String> = lookup("SCAN_EXTRA_KEYWORDS")
            .unwrap_or_default()
            .split(';')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let repeat_interval = match lookup("SCAN_REPEAT_INTERVAL_SECS") {
            Some(raw) => {
                let secs: u64 = parse_value("SCAN_REPEAT_INTERVAL_SECS", &raw)?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => None,
        };

        let log_dir = lookup("SCAN_LOG_DIR").filter(|s| !s.trim().is_empty());

        Ok(Self {
            token: SecretString::from(token),
            webhook_url: SecretString::from(webhook_url),
            api_base,
            enumerator,
            pacing,
            extra_keywords,
            repeat_interval,
            log_dir,
        })
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?}: {e}"),
    })
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn millis_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => parse_value::<u64>(key, &raw).map(Duration::from_millis),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const CREDS: [(&str, &str); 2] = [
        ("DISCORD_TOKEN", "tok"),
        ("WEBHOOK_URL", "https://hooks.example/abc"),
    ];

    #[test]
    fn defaults_applied() {
        let config = ScanConfig::from_lookup(lookup_from(&CREDS)).unwrap();
        assert_eq!(config.token.expose_secret(), "tok");
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.enumerator.sufficiency_ratio, 0.9);
        assert_eq!(config.enumerator.supplemental_rounds, 5);
        assert_eq!(config.enumerator.page_size, 1000);
        assert_eq!(config.enumerator.max_pages, 10);
        assert_eq!(config.pacing.emit_pacing, Duration::from_millis(1500));
        assert!(config.extra_keywords.is_empty());
        assert!(config.repeat_interval.is_none());
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn missing_token_is_an_error() {
        let err = ScanConfig::from_lookup(lookup_from(&[("WEBHOOK_URL", "x")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "DISCORD_TOKEN"));
    }

    #[test]
    fn blank_webhook_is_missing() {
        let err = ScanConfig::from_lookup(lookup_from(&[
            ("DISCORD_TOKEN", "tok"),
            ("WEBHOOK_URL", "   "),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "WEBHOOK_URL"));
    }

    #[test]
    fn overrides_parsed() {
        let mut pairs = CREDS.to_vec();
        pairs.extend([
            ("DISCORD_API_BASE", "http://127.0.0.1:9000/api/"),
            ("SCAN_SUFFICIENCY_RATIO", "0.75"),
            ("SCAN_SUPPLEMENTAL_ROUNDS", "2"),
            ("SCAN_PAGE_SIZE", "50"),
            ("SCAN_MAX_PAGES", "3"),
            ("SCAN_PAGE_DELAY_MS", "10"),
            ("SCAN_NOTIFY_SPACING_MS", "0"),
            ("SCAN_EXTRA_KEYWORDS", "playstation; ;psn"),
            ("SCAN_REPEAT_INTERVAL_SECS", "600"),
        ]);
        let config = ScanConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.api_base, "http://127.0.0.1:9000/api");
        assert_eq!(config.enumerator.sufficiency_ratio, 0.75);
        assert_eq!(config.enumerator.supplemental_rounds, 2);
        assert_eq!(config.enumerator.page_size, 50);
        assert_eq!(config.enumerator.max_pages, 3);
        assert_eq!(config.enumerator.page_delay, Duration::from_millis(10));
        assert_eq!(config.pacing.notify_spacing, Duration::ZERO);
        assert_eq!(config.extra_keywords, vec!["playstation", "psn"]);
        assert_eq!(config.repeat_interval, Some(Duration::from_secs(600)));
    }

    #[test]
    fn zero_repeat_interval_means_single_pass() {
        let mut pairs = CREDS.to_vec();
        pairs.push(("SCAN_REPEAT_INTERVAL_SECS", "0"));
        let config = ScanConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert!(config.repeat_interval.is_none());
    }

    #[test]
    fn rejects_ratio_out_of_range() {
        let mut pairs = CREDS.to_vec();
        pairs.push(("SCAN_SUFFICIENCY_RATIO", "1.5"));
        let err = ScanConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "SCAN_SUFFICIENCY_RATIO"));
    }

    #[test]
    fn rejects_garbage_number() {
        let mut pairs = CREDS.to_vec();
        pairs.push(("SCAN_MAX_PAGES", "ten"));
        let err = ScanConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "SCAN_MAX_PAGES"));
    }

    #[test]
    fn rejects_zero_page_size() {
        let mut pairs = CREDS.to_vec();
        pairs.push(("SCAN_PAGE_SIZE", "0"));
        assert!(ScanConfig::from_lookup(lookup_from(&pairs)).is_err());
    }
}
