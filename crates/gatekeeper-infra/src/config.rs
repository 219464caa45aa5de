//! Typed gatekeeper configuration, built once at startup.
//!
//! Every value has an explicit default and can be overridden through the
//! environment. Values that are present but unparsable are rejected rather
//! than silently replaced by the default.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use gatekeeper_core::ConfigError;
use gatekeeper_core::domain::{EjectionPolicy, ProtectionLimits, mask_secret};

/// Reads an optional variable and parses it, falling back to `default`
/// only when the variable is unset or blank.
pub(crate) fn parse_var<T, L>(lookup: &L, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    L: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value: raw })
        }
        _ => Ok(default),
    }
}

fn non_zero(key: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Zero { key });
    }
    Ok(())
}

pub(crate) fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Inbound admission limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionConfig {
    /// Largest accepted request body, in bytes.
    pub max_request_size: u64,
    pub max_requests_per_minute: u32,
    pub max_requests_per_hour: u32,
    pub block_duration: Duration,
    /// Minute-limit violations tolerated before a hard block.
    pub suspicious_threshold: u32,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_request_size: 10 * 1024 * 1024,
            max_requests_per_minute: 60,
            max_requests_per_hour: 1000,
            block_duration: Duration::from_secs(15 * 60),
            suspicious_threshold: 5,
        }
    }
}

impl AdmissionConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let block_minutes: u64 = parse_var(
            &lookup,
            "BLOCK_DURATION_MINUTES",
            defaults.block_duration.as_secs() / 60,
        )?;

        let config = Self {
            max_request_size: parse_var(&lookup, "MAX_REQUEST_SIZE", defaults.max_request_size)?,
            max_requests_per_minute: parse_var(
                &lookup,
                "MAX_REQUESTS_PER_MINUTE",
                defaults.max_requests_per_minute,
            )?,
            max_requests_per_hour: parse_var(
                &lookup,
                "MAX_REQUESTS_PER_HOUR",
                defaults.max_requests_per_hour,
            )?,
            block_duration: Duration::from_secs(block_minutes.saturating_mul(60)),
            suspicious_threshold: parse_var(
                &lookup,
                "SUSPICIOUS_THRESHOLD",
                defaults.suspicious_threshold,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        non_zero("MAX_REQUEST_SIZE", self.max_request_size)?;
        non_zero("MAX_REQUESTS_PER_MINUTE", self.max_requests_per_minute.into())?;
        non_zero("MAX_REQUESTS_PER_HOUR", self.max_requests_per_hour.into())?;
        non_zero("BLOCK_DURATION_MINUTES", self.block_duration.as_secs())?;
        non_zero("SUSPICIOUS_THRESHOLD", self.suspicious_threshold.into())?;

        if self.max_requests_per_hour < self.max_requests_per_minute {
            return Err(ConfigError::Inconsistent(format!(
                "MAX_REQUESTS_PER_HOUR ({}) is below MAX_REQUESTS_PER_MINUTE ({})",
                self.max_requests_per_hour, self.max_requests_per_minute
            )));
        }
        Ok(())
    }

    pub fn limits(&self) -> ProtectionLimits {
        ProtectionLimits {
            max_request_size: self.max_request_size,
            max_requests_per_minute: self.max_requests_per_minute,
            max_requests_per_hour: self.max_requests_per_hour,
            block_duration_minutes: u32::try_from(self.block_duration.as_secs() / 60)
                .unwrap_or(u32::MAX),
            suspicious_threshold: self.suspicious_threshold,
        }
    }
}

/// Outbound credential pool settings.
#[derive(Clone, PartialEq, Eq)]
pub struct CapacityConfig {
    /// Raw credential secrets, deduplicated, in configuration order.
    pub credentials: Vec<String>,
    pub max_errors_per_credential: u32,
    pub error_reset_window: Duration,
    /// Total attempts per call across the pool.
    pub max_retries: u32,
    pub attempt_timeout: Duration,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            credentials: Vec::new(),
            max_errors_per_credential: 5,
            error_reset_window: Duration::from_millis(300_000),
            max_retries: 3,
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

// Secrets never reach logs through Debug.
impl fmt::Debug for CapacityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked: Vec<String> = self.credentials.iter().map(|c| mask_secret(c)).collect();
        f.debug_struct("CapacityConfig")
            .field("credentials", &masked)
            .field("max_errors_per_credential", &self.max_errors_per_credential)
            .field("error_reset_window", &self.error_reset_window)
            .field("max_retries", &self.max_retries)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}

impl CapacityConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// Reads `UPSTREAM_API_KEY` (primary) and `UPSTREAM_API_KEYS` (extras,
    /// comma or whitespace separated). An empty pool is valid here; calls
    /// fail fast later instead.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let primary = lookup("UPSTREAM_API_KEY");
        let extras = lookup("UPSTREAM_API_KEYS");
        let reset_ms: u64 = parse_var(
            &lookup,
            "ERROR_RESET_WINDOW_MS",
            u64::try_from(defaults.error_reset_window.as_millis()).unwrap_or(u64::MAX),
        )?;
        let timeout_secs: u64 = parse_var(
            &lookup,
            "UPSTREAM_TIMEOUT_SECS",
            defaults.attempt_timeout.as_secs(),
        )?;

        let config = Self {
            credentials: parse_credentials(primary.as_deref(), extras.as_deref()),
            max_errors_per_credential: parse_var(
                &lookup,
                "MAX_ERRORS_PER_CREDENTIAL",
                defaults.max_errors_per_credential,
            )?,
            error_reset_window: Duration::from_millis(reset_ms),
            max_retries: parse_var(&lookup, "UPSTREAM_MAX_RETRIES", defaults.max_retries)?,
            attempt_timeout: Duration::from_secs(timeout_secs),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        non_zero("MAX_ERRORS_PER_CREDENTIAL", self.max_errors_per_credential.into())?;
        non_zero(
            "ERROR_RESET_WINDOW_MS",
            u64::try_from(self.error_reset_window.as_millis()).unwrap_or(u64::MAX),
        )?;
        non_zero("UPSTREAM_MAX_RETRIES", self.max_retries.into())?;
        non_zero("UPSTREAM_TIMEOUT_SECS", self.attempt_timeout.as_secs())?;
        Ok(())
    }

    pub fn policy(&self) -> EjectionPolicy {
        EjectionPolicy {
            max_errors: self.max_errors_per_credential,
            error_reset_window: self.error_reset_window,
        }
    }
}

/// Full gatekeeper configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatekeeperConfig {
    pub admission: AdmissionConfig,
    pub capacity: CapacityConfig,
}

impl GatekeeperConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            admission: AdmissionConfig::from_env()?,
            capacity: CapacityConfig::from_env()?,
        })
    }
}

/// Collects the primary credential and any extras into one pool,
/// dropping blanks and duplicates while keeping first-seen order.
pub fn parse_credentials(primary: Option<&str>, extras: Option<&str>) -> Vec<String> {
    let extras = extras
        .into_iter()
        .flat_map(|list| list.split(|c: char| c == ',' || c.is_whitespace()));

    dedupe_credentials(primary.into_iter().chain(extras))
}

pub fn dedupe_credentials<I, S>(credentials: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    credentials
        .into_iter()
        .map(|c| c.as_ref().trim().to_string())
        .filter(|c| !c.is_empty())
        .filter(|c| seen.insert(c.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_admission_defaults() {
        let config = AdmissionConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AdmissionConfig::default());
        assert_eq!(config.limits().block_duration_minutes, 15);
    }

    #[test]
    fn test_admission_overrides() {
        let config = AdmissionConfig::from_lookup(lookup(&[
            ("MAX_REQUESTS_PER_MINUTE", "3"),
            ("MAX_REQUESTS_PER_HOUR", " 10 "),
            ("BLOCK_DURATION_MINUTES", "2"),
        ]))
        .unwrap();

        assert_eq!(config.max_requests_per_minute, 3);
        assert_eq!(config.max_requests_per_hour, 10);
        assert_eq!(config.block_duration, Duration::from_secs(120));
    }

    #[test]
    fn test_unparsable_value_is_rejected() {
        let err = AdmissionConfig::from_lookup(lookup(&[("MAX_REQUESTS_PER_MINUTE", "lots")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "MAX_REQUESTS_PER_MINUTE",
                value: "lots".into()
            }
        );
    }

    #[test]
    fn test_zero_and_inverted_limits_are_rejected() {
        let err =
            AdmissionConfig::from_lookup(lookup(&[("SUSPICIOUS_THRESHOLD", "0")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Zero {
                key: "SUSPICIOUS_THRESHOLD"
            }
        );

        let err = AdmissionConfig::from_lookup(lookup(&[
            ("MAX_REQUESTS_PER_MINUTE", "100"),
            ("MAX_REQUESTS_PER_HOUR", "50"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Inconsistent(_)));
    }

    #[test]
    fn test_parse_credentials_dedupes_in_order() {
        let parsed = parse_credentials(
            Some("key-primary"),
            Some("key-b, key-a key-primary,,\nkey-b  key-c"),
        );
        assert_eq!(parsed, vec!["key-primary", "key-b", "key-a", "key-c"]);
    }

    #[test]
    fn test_capacity_from_lookup() {
        let config = CapacityConfig::from_lookup(lookup(&[
            ("UPSTREAM_API_KEY", "primary-secret-value"),
            ("UPSTREAM_API_KEYS", "extra-secret-value"),
            ("ERROR_RESET_WINDOW_MS", "60000"),
        ]))
        .unwrap();

        assert_eq!(config.credentials.len(), 2);
        assert_eq!(config.error_reset_window, Duration::from_secs(60));
        assert_eq!(config.policy().max_errors, 5);
    }

    #[test]
    fn test_capacity_without_credentials_is_valid() {
        let config = CapacityConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.credentials.is_empty());
    }

    #[test]
    fn test_capacity_debug_masks_secrets() {
        let config = CapacityConfig {
            credentials: vec!["sk-live-0123456789".into()],
            ..CapacityConfig::default()
        };
        let shown = format!("{config:?}");
        assert!(!shown.contains("0123456789"));
        assert!(shown.contains("sk-l...6789"));
    }
}
