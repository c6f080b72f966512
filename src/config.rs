//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::mailbox::ImapConfig;
use crate::notify::SmtpConfig;
use crate::store::DEFAULT_STORE_FILE;

/// Default log file, relative to the working directory.
pub const DEFAULT_LOG_FILE: &str = "tracker.log";

/// Everything the tracker needs to run a cycle.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub imap: ImapConfig,
    pub smtp: SmtpConfig,
    /// Where notifications go.
    pub recipient: String,
    pub store_path: PathBuf,
    pub log_file: PathBuf,
    /// Repeat cycles at this interval instead of running once.
    pub interval: Option<Duration>,
}

impl TrackerConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));

        let imap_host = require("IMAP_SERVER")?;
        let imap_port = parse_or(get("IMAP_PORT"), "IMAP_PORT", 993u16)?;
        let address = require("EMAIL_ADDRESS")?;
        let password = SecretString::from(require("EMAIL_PASSWORD")?);
        let smtp_host = require("SMTP_SERVER")?;
        let smtp_port = parse_or(get("SMTP_PORT"), "SMTP_PORT", 587u16)?;
        let recipient = require("RECIPIENT_EMAIL")?;

        let interval = match get("HYTRACK_INTERVAL_SECS") {
            Some(raw) => {
                let secs: u64 = parse_or(Some(raw), "HYTRACK_INTERVAL_SECS", 0)?;
                if secs == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "HYTRACK_INTERVAL_SECS".into(),
                        message: "must be greater than zero".into(),
                    });
                }
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(Self {
            imap: ImapConfig {
                host: imap_host,
                port: imap_port,
                username: address.clone(),
                password: password.clone(),
                mailbox: get("HYTRACK_MAILBOX").unwrap_or_else(|| "INBOX".to_string()),
            },
            smtp: SmtpConfig {
                host: smtp_host,
                port: smtp_port,
                username: address.clone(),
                password,
                from_address: address,
            },
            recipient,
            store_path: get("HYTRACK_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_FILE)),
            log_file: get("HYTRACK_LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
            interval,
        })
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn base() -> HashMap<String, String> {
        env(&[
            ("IMAP_SERVER", "imap.test.com"),
            ("EMAIL_ADDRESS", "me@test.com"),
            ("EMAIL_PASSWORD", "secret"),
            ("SMTP_SERVER", "smtp.test.com"),
            ("RECIPIENT_EMAIL", "alerts@test.com"),
        ])
    }

    fn load(vars: &HashMap<String, String>) -> Result<TrackerConfig, ConfigError> {
        TrackerConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_applied() {
        let cfg = load(&base()).unwrap();
        assert_eq!(cfg.imap.port, 993);
        assert_eq!(cfg.imap.mailbox, "INBOX");
        assert_eq!(cfg.smtp.port, 587);
        assert_eq!(cfg.smtp.from_address, "me@test.com");
        assert_eq!(cfg.imap.password.expose_secret(), "secret");
        assert_eq!(cfg.store_path, PathBuf::from("active_ids.json"));
        assert_eq!(cfg.log_file, PathBuf::from("tracker.log"));
        assert!(cfg.interval.is_none());
    }

    #[test]
    fn missing_required_var() {
        let mut vars = base();
        vars.remove("RECIPIENT_EMAIL");
        let err = load(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "RECIPIENT_EMAIL"));
    }

    #[test]
    fn blank_counts_as_missing() {
        let mut vars = base();
        vars.insert("IMAP_SERVER".into(), "  ".into());
        assert!(matches!(load(&vars).unwrap_err(), ConfigError::MissingEnvVar(_)));
    }

    #[test]
    fn bad_port_is_invalid() {
        let mut vars = base();
        vars.insert("SMTP_PORT".into(), "smtp".into());
        assert!(matches!(
            load(&vars).unwrap_err(),
            ConfigError::InvalidValue { ref key, .. } if key == "SMTP_PORT"
        ));
    }

    #[test]
    fn overrides_read() {
        let mut vars = base();
        vars.insert("IMAP_PORT".into(), "1993".into());
        vars.insert("HYTRACK_STORE_PATH".into(), "/var/lib/hytrack/ids.json".into());
        vars.insert("HYTRACK_INTERVAL_SECS".into(), "900".into());
        vars.insert("HYTRACK_MAILBOX".into(), "Shipping".into());
        let cfg = load(&vars).unwrap();
        assert_eq!(cfg.imap.port, 1993);
        assert_eq!(cfg.imap.mailbox, "Shipping");
        assert_eq!(cfg.store_path, PathBuf::from("/var/lib/hytrack/ids.json"));
        assert_eq!(cfg.interval, Some(Duration::from_secs(900)));
    }

    #[test]
    fn zero_interval_rejected() {
        let mut vars = base();
        vars.insert("HYTRACK_INTERVAL_SECS".into(), "0".into());
        assert!(matches!(load(&vars).unwrap_err(), ConfigError::InvalidValue { .. }));
    }
}
