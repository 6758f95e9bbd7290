//! Configuration management

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::cache::{DEFAULT_CAPACITY, DEFAULT_TTL_SECS};
use crate::query::filter::FilterLists;
use crate::query::ident::{Ident, TableNames};
use crate::query::listing::{
    PageGuard, BUILDER_DEFAULT_LIMIT, DEFAULT_MAX_LIMIT, DEFAULT_MAX_PAGE, SEARCH_DEFAULT_LIMIT,
};

static ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("address regex is valid"));

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    pub filters: FilterConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default)]
    pub tables: TableConfig,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Seconds to wait for a free pool connection before giving up.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    /// Create tables and indexes on startup (development only).
    #[serde(default)]
    pub create_schema: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    pub overview: String,
    pub attack: String,
    pub backrun: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            overview: "block_overview".to_string(),
            attack: "sandwich_attack".to_string(),
            backrun: "sandwich_backrun".to_string(),
        }
    }
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub capacity: usize,
    /// Precompute the default dashboard views at startup.
    pub warm_on_start: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            capacity: DEFAULT_CAPACITY,
            warm_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub max_page: i64,
    pub max_limit: i64,
    pub builder_default_limit: i64,
    pub search_default_limit: i64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            max_page: DEFAULT_MAX_PAGE,
            max_limit: DEFAULT_MAX_LIMIT,
            builder_default_limit: BUILDER_DEFAULT_LIMIT,
            search_default_limit: SEARCH_DEFAULT_LIMIT,
        }
    }
}

/// Address allow-lists. Versioned so deployments can tell which list is live.
#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    pub version: String,
    pub native_token: String,
    pub stable_tokens: Vec<String>,
    pub public_routers: Vec<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = "config.toml";

        let builder = config::Config::builder()
            .add_source(config::File::with_name(config_path))
            .add_source(config::Environment::with_prefix("SANDWICH").separator("__"));

        let settings = builder.build()?;
        let config: Config = settings.try_deserialize()?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Invalid port: 0 is not allowed");
        }
        if self.server.host.is_empty() {
            anyhow::bail!("Server host cannot be empty");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }
        if !self.database.url.starts_with("postgres://") && !self.database.url.starts_with("postgresql://") {
            anyhow::bail!("Database URL must be a postgres:// connection string");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be at least 1");
        }
        self.table_names()?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("Invalid logging level '{}'. Must be one of: {:?}", self.logging.level, valid_levels);
        }

        if self.cache.ttl_secs == 0 || self.cache.capacity == 0 {
            anyhow::bail!("cache.ttl_secs and cache.capacity must be greater than 0");
        }

        let p = &self.pagination;
        if p.max_page < 1 || p.max_limit < 1 {
            anyhow::bail!("pagination.max_page and pagination.max_limit must be at least 1");
        }
        for (name, value) in [
            ("builder_default_limit", p.builder_default_limit),
            ("search_default_limit", p.search_default_limit),
        ] {
            if value < 1 || value > p.max_limit {
                anyhow::bail!("pagination.{} must be within [1, {}]", name, p.max_limit);
            }
        }

        let f = &self.filters;
        let addresses = std::iter::once(&f.native_token)
            .chain(&f.stable_tokens)
            .chain(&f.public_routers);
        for address in addresses {
            if !ADDRESS_RE.is_match(address.trim()) {
                anyhow::bail!("Invalid address '{}' in [filters] (version {})", address, f.version);
            }
        }

        Ok(())
    }

    pub fn schema(&self) -> Result<Ident> {
        Ok(Ident::new(&self.database.schema)?)
    }

    pub fn table_names(&self) -> Result<TableNames> {
        let t = &self.database.tables;
        Ok(TableNames::new(&self.database.schema, &t.overview, &t.attack, &t.backrun)?)
    }

    pub fn filter_lists(&self) -> FilterLists {
        let f = &self.filters;
        FilterLists::new(f.version.clone(), &f.native_token, &f.stable_tokens, &f.public_routers)
    }

    pub fn page_guard(&self) -> PageGuard {
        PageGuard {
            max_page: self.pagination.max_page,
            max_limit: self.pagination.max_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        let toml = r#"
            [server]
            host = "127.0.0.1"
            port = 8080

            [database]
            url = "postgres://localhost/mev"
            schema = "mev"

            [logging]
            level = "info"

            [filters]
            version = "2024-06-01"
            native_token = "0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c"
            stable_tokens = ["0x55d398326f99059fF775485246999027B3197955"]
            public_routers = ["0x10ED43C718714eb63d5aA57B78B54704E256024E"]
        "#;
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn sections_fall_back_to_defaults() {
        let config = sample();
        config.validate().unwrap();
        assert_eq!(config.cache.ttl_secs, 30);
        assert_eq!(config.cache.capacity, 100);
        assert_eq!(config.pagination.max_page, 100);
        assert_eq!(config.database.tables.overview, "block_overview");
        assert_eq!(config.table_names().unwrap().attack, "\"mev\".\"sandwich_attack\"");
    }

    #[test]
    fn filter_lists_are_lower_cased() {
        let lists = sample().filter_lists();
        assert_eq!(lists.native_token, "0xbb4cdb9cbd36b01bd1cbaebf2de08d9173bc095c");
        assert_eq!(lists.stable_tokens, ["0x55d398326f99059ff775485246999027b3197955"]);
        assert_eq!(lists.version, "2024-06-01");
    }

    #[test]
    fn rejects_unsafe_table_names() {
        let mut config = sample();
        config.database.tables.attack = "attack; DROP".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_malformed_addresses() {
        let mut config = sample();
        config.filters.public_routers.push("pancake".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_default_limit_above_cap() {
        let mut config = sample();
        config.pagination.search_default_limit = 500;
        assert!(config.validate().is_err());
    }
}
