use log::warn;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("REPOSITORY must be `memory` or `database`, not `{0}`")]
    UnknownBackend(String),
    #[error("SECRET_KEY must be at least 32 bytes long")]
    ShortSecretKey,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backend {
    Memory,
    Database,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Backend, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Backend::Memory),
            "database" => Ok(Backend::Database),
            other => Err(ConfigError::UnknownBackend(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub repository: Backend,
    pub database_path: PathBuf,
    pub data_path: PathBuf,
    pub omdb_api_key: Option<String>,
    pub secret_key: Vec<u8>,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        if let Err(err) = dotenv::dotenv() {
            warn!("no .env file loaded: {}", err);
        }
        Config::from_vars(|name| env::var(name).ok())
    }

    fn from_vars<F: Fn(&str) -> Option<String>>(var: F) -> Result<Config, ConfigError> {
        let secret_key = match var("SECRET_KEY") {
            Some(key) if key.len() >= 32 => key.into_bytes(),
            Some(_) => return Err(ConfigError::ShortSecretKey),
            None => {
                warn!("SECRET_KEY is not set, login cookies use an all-zero key");
                vec![0u8; 32]
            }
        };
        Ok(Config {
            bind_address: var("BIND_ADDRESS").unwrap_or_else(|| "127.0.0.1:8080".to_owned()),
            repository: var("REPOSITORY")
                .as_deref()
                .unwrap_or("memory")
                .parse()?,
            database_path: var("DATABASE_PATH")
                .unwrap_or_else(|| "cinebase.db".to_owned())
                .into(),
            data_path: var("DATA_PATH")
                .unwrap_or_else(|| concat!(env!("CARGO_MANIFEST_DIR"), "/data").to_owned())
                .into(),
            omdb_api_key: var("OMDB_API_KEY").filter(|key| !key.is_empty()),
            secret_key,
        })
    }

    pub fn movies_file(&self) -> PathBuf {
        self.data_path.join("movies.csv")
    }

    pub fn users_file(&self) -> PathBuf {
        self.data_path.join("users.csv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:8080");
        assert_eq!(config.repository, Backend::Memory);
        assert_eq!(config.omdb_api_key, None);
        assert_eq!(config.secret_key.len(), 32);
        assert!(config.movies_file().ends_with("data/movies.csv"));
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("REPOSITORY", "Database"),
            ("DATABASE_PATH", "/tmp/movies.db"),
            ("OMDB_API_KEY", "abc123"),
            ("SECRET_KEY", "0123456789abcdef0123456789abcdef"),
        ])
        .unwrap();
        assert_eq!(config.repository, Backend::Database);
        assert_eq!(config.database_path, PathBuf::from("/tmp/movies.db"));
        assert_eq!(config.omdb_api_key.as_deref(), Some("abc123"));
        assert_eq!(config.secret_key, b"0123456789abcdef0123456789abcdef");
    }

    #[test]
    fn rejects_bad_values() {
        assert_eq!(
            config(&[("REPOSITORY", "redis")]).unwrap_err(),
            ConfigError::UnknownBackend("redis".to_owned())
        );
        assert_eq!(
            config(&[("SECRET_KEY", "short")]).unwrap_err(),
            ConfigError::ShortSecretKey
        );
    }
}
