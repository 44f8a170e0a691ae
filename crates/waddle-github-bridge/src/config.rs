//! Bridge configuration.
//!
//! Loaded from a TOML file, then overridden from the environment:
//!
//! | Variable | Overrides |
//! |---|---|
//! | `WADDLE_BRIDGE_LISTEN` | `listen` |
//! | `WADDLE_BRIDGE_HOMESERVER` | `homeserver_url` |
//! | `WADDLE_BRIDGE_ACCESS_TOKEN` | `access_token` |
//! | `GITHUB_TOKEN` | `github_token` of services that set none |

use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

use crate::error::ConfigError;
use crate::subscription::SubscriptionTable;

const DEFAULT_LISTEN: &str = "0.0.0.0:4050";

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Address the HTTP host binds to.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Matrix homeserver base URL.
    #[serde(default)]
    pub homeserver_url: String,
    /// Access token of the bridge account.
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

/// One configured integration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub service_type: String,
    /// Account the service posts as.
    pub user_id: String,
    /// Shared secret for webhook signatures. Unset disables verification.
    pub webhook_secret: Option<String>,
    pub github_token: Option<String>,
    #[serde(default)]
    pub rooms: SubscriptionTable,
}

impl BridgeConfig {
    /// Parsed listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen.parse().map_err(|e| ConfigError::InvalidValue {
            field: "listen".to_string(),
            message: format!("{e}"),
        })
    }
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

#[derive(Debug, Default, Clone)]
struct ConfigOverrides {
    listen: Option<String>,
    homeserver_url: Option<String>,
    access_token: Option<String>,
    github_token: Option<String>,
}

/// Load configuration from a file, applying environment overrides.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<BridgeConfig, ConfigError> {
    let path = path.as_ref();
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(ConfigError::Io(e)),
    };
    load_config_from_str_with_overrides(&contents, config_overrides_from_env())
}

/// Parse configuration from a TOML string, applying environment overrides.
pub fn load_config_from_str(toml_str: &str) -> Result<BridgeConfig, ConfigError> {
    load_config_from_str_with_overrides(toml_str, config_overrides_from_env())
}

fn load_config_from_str_with_overrides(
    toml_str: &str,
    overrides: ConfigOverrides,
) -> Result<BridgeConfig, ConfigError> {
    let mut config: BridgeConfig = toml::from_str(toml_str).map_err(|e| {
        let (line, column) = e.span().map_or((0, 0), |span| {
            let before = &toml_str[..span.start];
            let line = before.chars().filter(|&c| c == '\n').count() + 1;
            let column = before
                .rfind('\n')
                .map_or(span.start + 1, |nl| span.start - nl);
            (line, column)
        });
        ConfigError::InvalidToml {
            line,
            column,
            message: e.message().to_string(),
        }
    })?;

    apply_overrides(&mut config, overrides);
    validate(&config)?;

    Ok(config)
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn config_overrides_from_env() -> ConfigOverrides {
    ConfigOverrides {
        listen: non_empty_env("WADDLE_BRIDGE_LISTEN"),
        homeserver_url: non_empty_env("WADDLE_BRIDGE_HOMESERVER"),
        access_token: non_empty_env("WADDLE_BRIDGE_ACCESS_TOKEN"),
        github_token: non_empty_env("GITHUB_TOKEN"),
    }
}

fn apply_overrides(config: &mut BridgeConfig, overrides: ConfigOverrides) {
    if let Some(listen) = overrides.listen {
        config.listen = listen;
    }
    if let Some(url) = overrides.homeserver_url {
        config.homeserver_url = url;
    }
    if let Some(token) = overrides.access_token {
        config.access_token = token;
    }
    if let Some(token) = overrides.github_token {
        for service in &mut config.services {
            if service.github_token.is_none() {
                service.github_token = Some(token.clone());
            }
        }
    }
}

fn validate(config: &BridgeConfig) -> Result<(), ConfigError> {
    let mut missing = Vec::new();

    if config.homeserver_url.is_empty() {
        missing.push("homeserver_url".to_string());
    }
    if config.access_token.is_empty() {
        missing.push("access_token".to_string());
    }
    for (i, service) in config.services.iter().enumerate() {
        if service.id.is_empty() {
            missing.push(format!("services[{i}].id"));
        }
        if service.user_id.is_empty() {
            missing.push(format!("services[{i}].user_id"));
        }
    }

    if !missing.is_empty() {
        return Err(ConfigError::MissingRequiredFields { fields: missing });
    }

    config.listen_addr()?;

    if url::Url::parse(&config.homeserver_url).is_err() {
        return Err(ConfigError::InvalidValue {
            field: "homeserver_url".to_string(),
            message: "must be an absolute URL".to_string(),
        });
    }

    let mut seen = HashSet::new();
    for service in &config.services {
        if !seen.insert(service.id.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "services.id".to_string(),
                message: format!("duplicate service id '{}'", service.id),
            });
        }
    }

    Ok(())
}
