use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::resolver::Dialect;
use crate::source::LineageStrategy;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub store: Option<DatabaseConfig>,
    pub server: Option<ServerConfig>,
    #[serde(default)]
    pub logging: LogConfig,
}

/// The PGSpider node lineage is read from.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_source_pool_size")]
    pub pool_size: usize,
    #[serde(default)]
    pub strategy: LineageStrategy,
    #[serde(default)]
    pub dialect: Dialect,
    #[serde(default = "default_query_log_limit")]
    pub query_log_limit: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            log_level: default_log_level(),
            max_log_files: default_max_log_files(),
        }
    }
}

fn default_log_dir() -> String {
    "./logs".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    7
}

fn default_source_pool_size() -> usize {
    4
}

fn default_query_log_limit() -> i64 {
    1000
}

fn default_pool_size() -> usize {
    16
}

fn default_worker_threads() -> usize {
    4
}

fn connection_url(host: &str, port: u16, dbname: &str, user: &str, password: &str) -> String {
    format!(
        "host={} port={} dbname={} user={} password={}",
        host, port, dbname, user, password
    )
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        Self::from_toml(&config_str)
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        toml::from_str(config_str).context("Failed to parse config file")
    }

    pub fn source_url(&self) -> String {
        let s = &self.source;
        connection_url(&s.host, s.port, &s.dbname, &s.user, &s.password)
    }

    pub fn store_url(&self) -> Option<String> {
        self.store
            .as_ref()
            .map(|d| connection_url(&d.host, d.port, &d.dbname, &d.user, &d.password))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MINIMAL: &str = r#"
        [source]
        service_name = "pgspider"
        host = "localhost"
        port = 4813
        dbname = "pgspider"
        user = "spider"
        password = "secret"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() -> Result<()> {
        let config = AppConfig::from_toml(MINIMAL)?;
        assert_eq!(config.source.service_name, "pgspider");
        assert_eq!(config.source.pool_size, 4);
        assert_eq!(config.source.strategy, LineageStrategy::MultiTenant);
        assert_eq!(config.source.dialect, Dialect::Postgres);
        assert_eq!(config.source.query_log_limit, 1000);
        assert!(config.store.is_none());
        assert!(config.server.is_none());
        assert_eq!(config.logging.log_dir, "./logs");
        assert_eq!(config.logging.log_level, "info");
        assert_eq!(config.logging.max_log_files, 7);
        assert_eq!(
            config.source_url(),
            "host=localhost port=4813 dbname=pgspider user=spider password=secret"
        );
        assert_eq!(config.store_url(), None);
        Ok(())
    }

    #[test]
    fn test_full_config() -> Result<()> {
        let config = AppConfig::from_toml(
            r#"
            [source]
            service_name = "spider_prod"
            host = "10.0.0.5"
            port = 4813
            dbname = "pgspider"
            user = "spider"
            password = "secret"
            strategy = "query_log"
            dialect = "generic"
            query_log_limit = 20

            [store]
            host = "db"
            port = 5432
            dbname = "lineage"
            user = "lineage"
            password = "pw"

            [server]
            host = "0.0.0.0"
            port = 8080

            [logging]
            log_level = "debug"
            max_log_files = 3
            "#,
        )?;
        assert_eq!(config.source.strategy, LineageStrategy::QueryLog);
        assert_eq!(config.source.dialect, Dialect::Generic);
        assert_eq!(config.source.query_log_limit, 20);
        assert_eq!(config.store.as_ref().map(|s| s.pool_size), Some(16));
        assert_eq!(config.server.as_ref().map(|s| s.worker_threads), Some(4));
        assert_eq!(config.logging.log_level, "debug");
        assert_eq!(config.logging.max_log_files, 3);
        assert_eq!(
            config.store_url().as_deref(),
            Some("host=db port=5432 dbname=lineage user=lineage password=pw")
        );
        Ok(())
    }

    #[test]
    fn test_missing_source_is_an_error() {
        assert!(AppConfig::from_toml("[logging]\nlog_level = \"info\"\n").is_err());
    }
}
