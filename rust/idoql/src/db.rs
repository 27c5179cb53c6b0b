use crate::{
    config::AppConfig,
    query::{dialect::Dialect, version::SchemaVersion},
};
use anyhow::{Context, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};
use rustls_pemfile::certs;
use std::fs::File;
use std::io::BufReader;
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{error, info, warn};

enum PgTls {
    None,
    Rustls(MakeRustlsConnect),
}

/// Reads the IDO schema version from `<prefix>dbversion`.
///
/// Returns `None` when no database URL is configured or the dialect has no
/// driver here; the configured version (or the floor) applies then.
pub async fn probe_schema_version(config: &AppConfig) -> Result<Option<SchemaVersion>> {
    let Some(url) = config.database_url.as_deref() else {
        return Ok(None);
    };

    if config.connection.dialect != Dialect::Pgsql {
        warn!(
            dialect = %config.connection.dialect,
            "schema version probing is only supported for pgsql"
        );
        return Ok(None);
    }

    let pg_config = url
        .parse::<PgConfig>()
        .context("invalid IDOQL_DATABASE_URL")?;
    let tls = match config.pg_ssl_root_cert.as_deref() {
        Some(path) => PgTls::Rustls(build_tls_connector(
            path,
            config.pg_ssl_cert.as_deref(),
            config.pg_ssl_key.as_deref(),
        )?),
        None => PgTls::None,
    };

    let client = connect(&pg_config, tls).await?;
    let table = config.connection.table("dbversion");
    let sql = format!("SELECT version FROM {table}");
    let row = client
        .query_opt(sql.as_str(), &[])
        .await
        .with_context(|| format!("failed to read {table}"))?;

    let Some(row) = row else {
        warn!(%table, "no schema version row found");
        return Ok(None);
    };

    let raw: String = row.try_get(0).context("unexpected dbversion column type")?;
    let version = raw
        .parse::<SchemaVersion>()
        .with_context(|| format!("invalid schema version \"{raw}\""))?;
    info!(%version, "probed IDO schema version");
    Ok(Some(version))
}

async fn connect(config: &PgConfig, tls: PgTls) -> Result<Client> {
    match tls {
        PgTls::None => {
            let (client, connection) = config
                .connect(NoTls)
                .await
                .context("failed to connect to PostgreSQL")?;
            tokio::spawn(async move {
                if let Err(err) = connection.await {
                    error!(error = ?err, "postgres connection error");
                }
            });
            Ok(client)
        }
        PgTls::Rustls(connector) => {
            let (client, connection) = config
                .connect(connector)
                .await
                .context("failed to connect to PostgreSQL over TLS")?;
            tokio::spawn(async move {
                if let Err(err) = connection.await {
                    error!(error = ?err, "postgres connection error");
                }
            });
            Ok(client)
        }
    }
}

fn build_tls_connector(
    root_cert: &str,
    client_cert: Option<&str>,
    client_key: Option<&str>,
) -> Result<MakeRustlsConnect> {
    let mut reader = BufReader::new(
        File::open(root_cert).context("failed to open IDOQL_PG_SSL_ROOT_CERT")?,
    );
    let mut root_store = RootCertStore::empty();
    for cert in certs(&mut reader) {
        let cert = cert.context("failed to parse IDOQL_PG_SSL_ROOT_CERT")?;
        root_store
            .add(cert)
            .map_err(|_| anyhow::anyhow!("invalid certificate in IDOQL_PG_SSL_ROOT_CERT"))?;
    }

    let builder = ClientConfig::builder().with_root_certificates(root_store);
    let tls = match (client_cert, client_key) {
        (None, None) => builder.with_no_client_auth(),
        (Some(cert), Some(key)) => builder
            .with_client_auth_cert(load_client_certs(cert)?, load_client_key(key)?)
            .with_context(|| format!("failed to build client TLS config for {root_cert}"))?,
        _ => anyhow::bail!("IDOQL_PG_SSL_CERT and IDOQL_PG_SSL_KEY must both be set (or neither)"),
    };

    Ok(MakeRustlsConnect::new(tls))
}

fn load_client_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(
        File::open(path).with_context(|| format!("failed to open client certificate '{path}'"))?,
    );

    let chain = certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to parse client certificate")?;
    if chain.is_empty() {
        anyhow::bail!("client certificate file '{path}' contained no certificates");
    }
    Ok(chain)
}

fn load_client_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(
        File::open(path).with_context(|| format!("failed to open client key '{path}'"))?,
    );

    rustls_pemfile::private_key(&mut reader)
        .context("failed to parse client key")?
        .context("client key file contained no private keys")
}
