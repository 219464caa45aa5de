//! Application configuration loaded from environment variables.

use std::env;
use std::net::IpAddr;
use std::time::Duration;

use gatekeeper_core::ConfigError;
use gatekeeper_infra::GatekeeperConfig;
use gatekeeper_infra::database::DatabaseConfig;

#[cfg(feature = "http-client")]
use gatekeeper_infra::HttpUpstreamConfig;

/// Background sweep schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    /// Six-field cron expression, used when the scheduler is compiled in.
    pub cron: String,
    /// Period of the plain interval task otherwise.
    pub interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            cron: "0 */5 * * * *".to_string(),
            interval: Duration::from_secs(300),
        }
    }
}

impl SweepConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let interval = match env::var("SWEEP_INTERVAL_SECS") {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "SWEEP_INTERVAL_SECS",
                        value: raw,
                    });
                }
            },
            Err(_) => defaults.interval,
        };

        Ok(Self {
            cron: env::var("SWEEP_CRON")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.cron),
            interval,
        })
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Required on admin routes when set.
    pub admin_token: Option<String>,
    /// Reverse proxies allowed to report the client address.
    pub trusted_proxies: Vec<IpAddr>,
    pub gatekeeper: GatekeeperConfig,
    pub database: Option<DatabaseConfig>,
    pub redis_url: Option<String>,
    #[cfg(feature = "http-client")]
    pub upstream: HttpUpstreamConfig,
    pub sweep: SweepConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let gatekeeper = GatekeeperConfig::from_env()?;

        #[cfg(feature = "http-client")]
        let upstream = {
            let upstream = HttpUpstreamConfig::from_env()?;
            if !gatekeeper.capacity.credentials.is_empty() {
                upstream.validate()?;
            }
            upstream
        };

        let port = match env::var("PORT") {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key: "PORT", value: raw })?,
            Err(_) => 8080,
        };

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port,
            admin_token: env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
            trusted_proxies: parse_trusted_proxies(env::var("TRUSTED_PROXIES").ok().as_deref())?,
            gatekeeper,
            database: DatabaseConfig::from_env(),
            redis_url: env::var("REDIS_URL").ok().filter(|u| !u.is_empty()),
            #[cfg(feature = "http-client")]
            upstream,
            sweep: SweepConfig::from_env()?,
        })
    }
}

/// Comma or whitespace separated addresses.
fn parse_trusted_proxies(raw: Option<&str>) -> Result<Vec<IpAddr>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse().map_err(|_| ConfigError::Invalid {
                key: "TRUSTED_PROXIES",
                value: part.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trusted_proxies() {
        assert!(parse_trusted_proxies(None).unwrap().is_empty());
        assert_eq!(
            parse_trusted_proxies(Some("10.0.0.1, ::1")).unwrap(),
            vec![IpAddr::from([10, 0, 0, 1]), "::1".parse::<IpAddr>().unwrap()]
        );
        assert!(matches!(
            parse_trusted_proxies(Some("10.0.0.0/8")),
            Err(ConfigError::Invalid { key: "TRUSTED_PROXIES", .. })
        ));
    }
}
