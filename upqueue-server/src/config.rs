use std::{env, str::FromStr};

use thiserror::Error;
use upqueue_collab::{MetadataCredentials, SpotifyCredentials};
use upqueue_core::Config;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got \"{value}\"")]
    InvalidValue {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("{present} is set, but {missing} is not")]
    Incomplete {
        present: &'static str,
        missing: &'static str,
    },
}

/// Everything the server reads from its environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Without a database URL, data is kept in memory
    pub database_url: Option<String>,
    /// Proves sign-in requests come from the trusted front end
    pub sign_in_secret: Option<String>,
    pub core: Config,
    pub credentials: MetadataCredentials,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the configuration through a variable lookup, so it can be tested without touching the environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let port = parse(&lookup, "UPQUEUE_SERVER_PORT", "a port number")?.unwrap_or(DEFAULT_PORT);

        let allow_duplicate_urls = parse(&lookup, "UPQUEUE_ALLOW_DUPLICATES", "true or false")?
            .unwrap_or(defaults.allow_duplicate_urls);

        let history_size = parse(&lookup, "UPQUEUE_HISTORY_SIZE", "a positive number")?
            .unwrap_or(defaults.history_size);

        let spotify_id = non_empty(&lookup, "SPOTIFY_CLIENT_ID");
        let spotify_secret = non_empty(&lookup, "SPOTIFY_CLIENT_SECRET");

        let spotify = match (spotify_id, spotify_secret) {
            (Some(client_id), Some(client_secret)) => Some(SpotifyCredentials {
                client_id,
                client_secret,
            }),
            (Some(_), None) => {
                return Err(ConfigError::Incomplete {
                    present: "SPOTIFY_CLIENT_ID",
                    missing: "SPOTIFY_CLIENT_SECRET",
                })
            }
            (None, Some(_)) => {
                return Err(ConfigError::Incomplete {
                    present: "SPOTIFY_CLIENT_SECRET",
                    missing: "SPOTIFY_CLIENT_ID",
                })
            }
            (None, None) => None,
        };

        Ok(Self {
            port,
            database_url: non_empty(&lookup, "DATABASE_URL"),
            sign_in_secret: non_empty(&lookup, "UPQUEUE_SIGN_IN_SECRET"),
            core: Config {
                history_size,
                allow_duplicate_urls,
                ..defaults
            },
            credentials: MetadataCredentials {
                youtube_api_key: non_empty(&lookup, "YOUTUBE_API_KEY"),
                spotify,
            },
        })
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse<F, T>(lookup: &F, name: &'static str, expected: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    non_empty(lookup, name)
        .map(|value| {
            value.parse().map_err(|_| ConfigError::InvalidValue {
                name,
                value: value.clone(),
                expected,
            })
        })
        .transpose()
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.database_url.is_none());
        assert!(config.sign_in_secret.is_none());
        assert!(config.core.allow_duplicate_urls);
        assert_eq!(config.core.history_size, 20);
        assert!(config.credentials.youtube_api_key.is_none());
        assert!(config.credentials.spotify.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("UPQUEUE_SERVER_PORT", "8080"),
            ("DATABASE_URL", "postgres://localhost/upqueue"),
            ("UPQUEUE_ALLOW_DUPLICATES", "false"),
            ("UPQUEUE_HISTORY_SIZE", "5"),
            ("UPQUEUE_SIGN_IN_SECRET", "hunter2"),
            ("SPOTIFY_CLIENT_ID", "id"),
            ("SPOTIFY_CLIENT_SECRET", "secret"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/upqueue")
        );
        assert!(!config.core.allow_duplicate_urls);
        assert_eq!(config.core.history_size, 5);
        assert_eq!(config.sign_in_secret.as_deref(), Some("hunter2"));
        assert_eq!(config.credentials.spotify.unwrap().client_secret, "secret");
    }

    #[test]
    fn test_malformed_values() {
        assert!(matches!(
            config(&[("UPQUEUE_SERVER_PORT", "abc")]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            config(&[("UPQUEUE_ALLOW_DUPLICATES", "maybe")]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            config(&[("SPOTIFY_CLIENT_ID", "id")]),
            Err(ConfigError::Incomplete { .. })
        ));
    }
}
