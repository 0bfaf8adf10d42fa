use std::net::SocketAddr;
use std::path::PathBuf;

use zeroize::Zeroizing;

/// Application-level constants
pub const APP_NAME: &str = "SymptomChecker";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("Cannot determine home directory; set SYMCHECK_DATA_DIR")]
    NoHomeDir,
}

/// Runtime configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub llm: LlmConfig,
    /// Shared secret presented by the trusted identity front end when it
    /// opens a session on behalf of a signed-in user.
    pub identity_api_key: Option<Zeroizing<String>>,
    /// Emit the `Secure` flag on cookies. Disable only for plain-HTTP development.
    pub cookie_secure: bool,
    /// Browser origin allowed to call the API with credentials. Same-origin only when unset.
    pub cors_allow_origin: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Zeroizing<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_raw = lookup("SYMCHECK_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_addr = bind_raw.parse().map_err(|e| ConfigError::Invalid {
            var: "SYMCHECK_BIND",
            reason: format!("{e}"),
        })?;

        let data_dir = match lookup("SYMCHECK_DATA_DIR") {
            Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => app_data_dir()?,
        };

        let timeout_secs = match lookup("LLM_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                var: "LLM_TIMEOUT_SECS",
                reason: format!("{e}"),
            })?,
            None => DEFAULT_LLM_TIMEOUT_SECS,
        };
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "LLM_TIMEOUT_SECS",
                reason: "must be greater than zero".into(),
            });
        }

        let cookie_secure = match lookup("COOKIE_SECURE").as_deref() {
            None => true,
            Some("1") | Some("true") | Some("yes") => true,
            Some("0") | Some("false") | Some("no") => false,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "COOKIE_SECURE",
                    reason: format!("expected true/false, got '{other}'"),
                })
            }
        };

        let cors_allow_origin = match lookup("CORS_ALLOW_ORIGIN") {
            Some(raw) => parse_origin(&raw)?,
            None => None,
        };

        Ok(Self {
            bind_addr,
            data_dir,
            llm: LlmConfig {
                base_url: lookup("LLM_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
                api_key: Zeroizing::new(lookup("LLM_API_KEY").unwrap_or_default()),
                model: lookup("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
                timeout_secs,
            },
            identity_api_key: lookup("IDENTITY_API_KEY")
                .filter(|k| !k.is_empty())
                .map(Zeroizing::new),
            cookie_secure,
            cors_allow_origin,
        })
    }

    /// SQLite file backing the audit trail.
    pub fn audit_db_path(&self) -> PathBuf {
        self.data_dir.join("audit.db")
    }
}

/// `scheme://host[:port]`, trailing slash dropped. Blank means unset.
fn parse_origin(raw: &str) -> Result<Option<String>, ConfigError> {
    let origin = raw.trim().trim_end_matches('/');
    if origin.is_empty() {
        return Ok(None);
    }
    let invalid = |reason: &str| ConfigError::Invalid {
        var: "CORS_ALLOW_ORIGIN",
        reason: format!("{reason}, got '{origin}'"),
    };
    let host = origin
        .strip_prefix("https://")
        .or_else(|| origin.strip_prefix("http://"))
        .ok_or_else(|| invalid("expected an http:// or https:// origin"))?;
    if host.is_empty() || host.contains(['/', '*', '?', '#']) {
        return Err(invalid("expected scheme://host[:port] without path or wildcard"));
    }
    if !host.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(invalid("origin must be printable ASCII"));
    }
    Ok(Some(origin.to_string()))
}

/// Get the application data directory
/// ~/SymptomChecker/ unless overridden.
pub fn app_data_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(APP_NAME))
        .ok_or(ConfigError::NoHomeDir)
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "info,symptom_checker=debug,tower_http=info"
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup_from(&[("SYMCHECK_DATA_DIR", "/tmp/sc")])).unwrap();
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND);
        assert_eq!(config.llm.model, DEFAULT_LLM_MODEL);
        assert_eq!(config.llm.timeout_secs, DEFAULT_LLM_TIMEOUT_SECS);
        assert!(config.cookie_secure);
        assert!(config.identity_api_key.is_none());
        assert!(config.cors_allow_origin.is_none());
        assert_eq!(config.audit_db_path(), PathBuf::from("/tmp/sc/audit.db"));
    }

    #[test]
    fn overrides_apply() {
        let config = Config::from_lookup(lookup_from(&[
            ("SYMCHECK_BIND", "0.0.0.0:9000"),
            ("SYMCHECK_DATA_DIR", "/tmp/sc"),
            ("LLM_MODEL", "gpt-4o"),
            ("COOKIE_SECURE", "false"),
            ("IDENTITY_API_KEY", "front-end-secret"),
            ("CORS_ALLOW_ORIGIN", "https://portal.example.org/"),
        ]))
        .unwrap();
        assert_eq!(
            config.cors_allow_origin.as_deref(),
            Some("https://portal.example.org")
        );
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.llm.model, "gpt-4o");
        assert!(!config.cookie_secure);
        assert_eq!(
            config.identity_api_key.as_ref().map(|k| k.as_str()),
            Some("front-end-secret")
        );
    }

    #[test]
    fn invalid_bind_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("SYMCHECK_BIND", "not-an-address"),
            ("SYMCHECK_DATA_DIR", "/tmp/sc"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "SYMCHECK_BIND", .. }));
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("LLM_TIMEOUT_SECS", "0"),
            ("SYMCHECK_DATA_DIR", "/tmp/sc"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "LLM_TIMEOUT_SECS", .. }));
    }

    #[test]
    fn malformed_cors_origin_rejected() {
        for bad in [
            "portal.example.org",
            "https://",
            "https://*.example.org",
            "https://a.org/app",
            "https://bad host",
        ] {
            let err = Config::from_lookup(lookup_from(&[
                ("CORS_ALLOW_ORIGIN", bad),
                ("SYMCHECK_DATA_DIR", "/tmp/sc"),
            ]))
            .unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { var: "CORS_ALLOW_ORIGIN", .. }),
                "{bad} accepted"
            );
        }
    }

    #[test]
    fn blank_cors_origin_is_unset() {
        let config = Config::from_lookup(lookup_from(&[
            ("CORS_ALLOW_ORIGIN", "  "),
            ("SYMCHECK_DATA_DIR", "/tmp/sc"),
        ]))
        .unwrap();
        assert!(config.cors_allow_origin.is_none());
    }

    #[test]
    fn app_name_is_symptom_checker() {
        assert_eq!(APP_NAME, "SymptomChecker");
    }
}
