use crate::query::{
    dialect::{ConnectionDescriptor, Dialect},
    version::SchemaVersion,
};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub connection: ConnectionDescriptor,
    pub schema_version: Option<SchemaVersion>,
    pub database_url: Option<String>,
    pub pg_ssl_root_cert: Option<String>,
    pub pg_ssl_cert: Option<String>,
    pub pg_ssl_key: Option<String>,
    pub api_key: Option<String>,
    pub default_limit: u64,
    pub max_limit: u64,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    idoql_listen_addr: Option<String>,
    #[serde(default)]
    idoql_listen_host: Option<String>,
    #[serde(default)]
    idoql_listen_port: Option<u16>,
    #[serde(default = "default_db_type")]
    idoql_db_type: String,
    #[serde(default = "default_table_prefix")]
    idoql_table_prefix: String,
    #[serde(default = "default_db_host")]
    idoql_db_host: String,
    #[serde(default = "default_db_name")]
    idoql_db_name: String,
    #[serde(default)]
    idoql_schema_version: Option<String>,
    #[serde(default)]
    idoql_database_url: Option<String>,
    #[serde(default)]
    idoql_pg_ssl_root_cert: Option<String>,
    #[serde(default)]
    idoql_pg_ssl_cert: Option<String>,
    #[serde(default)]
    idoql_pg_ssl_key: Option<String>,
    #[serde(default)]
    idoql_api_key: Option<String>,
    #[serde(default = "default_limit")]
    idoql_default_limit: u64,
    #[serde(default = "default_max_limit")]
    idoql_max_limit: u64,
}

fn default_db_type() -> String {
    "mysql".to_string()
}

fn default_table_prefix() -> String {
    "icinga_".to_string()
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_name() -> String {
    "icinga".to_string()
}

const fn default_limit() -> u64 {
    100
}

const fn default_max_limit() -> u64 {
    1000
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let raw: RawConfig =
            envy::from_env().context("failed to parse IDOQL_* environment variables")?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let listen_addr = resolve_addr(
            raw.idoql_listen_addr,
            raw.idoql_listen_host,
            raw.idoql_listen_port,
        )?;

        let dialect = Dialect::parse(&raw.idoql_db_type).with_context(|| {
            format!(
                "unsupported IDOQL_DB_TYPE \"{}\" (expected mysql, pgsql or oracle)",
                raw.idoql_db_type
            )
        })?;

        let schema_version = raw
            .idoql_schema_version
            .filter(|value| !value.trim().is_empty())
            .map(|value| {
                value
                    .parse::<SchemaVersion>()
                    .with_context(|| format!("invalid IDOQL_SCHEMA_VERSION \"{value}\""))
            })
            .transpose()?;

        let connection = ConnectionDescriptor::new(dialect, raw.idoql_table_prefix)
            .with_identity(raw.idoql_db_host, raw.idoql_db_name);

        let default_limit = raw.idoql_default_limit.max(1);

        Ok(Self {
            listen_addr,
            connection,
            schema_version,
            database_url: raw.idoql_database_url,
            pg_ssl_root_cert: raw.idoql_pg_ssl_root_cert,
            pg_ssl_cert: raw.idoql_pg_ssl_cert,
            pg_ssl_key: raw.idoql_pg_ssl_key,
            api_key: raw.idoql_api_key,
            default_limit,
            max_limit: raw.idoql_max_limit.max(default_limit),
        })
    }

    /// Configuration for embedding the engine without an environment.
    pub fn embedded(connection: ConnectionDescriptor) -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            connection,
            schema_version: None,
            database_url: None,
            pg_ssl_root_cert: None,
            pg_ssl_cert: None,
            pg_ssl_key: None,
            api_key: None,
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

fn resolve_addr(
    addr: Option<String>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<SocketAddr> {
    if let Some(addr) = addr {
        return addr
            .to_socket_addrs()
            .context("invalid IDOQL_LISTEN_ADDR value")?
            .next()
            .context("IDOQL_LISTEN_ADDR resolved to no addresses");
    }

    let host = host.unwrap_or_else(|| "0.0.0.0".to_string());
    let port = port.unwrap_or(8490);
    let combined = format!("{}:{}", host, port);
    combined
        .to_socket_addrs()
        .context("invalid IDOQL listen host/port combination")?
        .next()
        .context("listen address resolved to no targets")
}
