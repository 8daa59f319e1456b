use engine_core::error::DestinationError;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::{Client, Config, NoTls, config::SslMode};
use tracing::{error, warn};

/// Opens a client honoring the `sslmode` of the connection string; `prefer`
/// falls back to plain TCP when the TLS handshake fails.
pub async fn connect_client(url: &str) -> Result<Client, DestinationError> {
    let config = url
        .parse::<Config>()
        .map_err(|e| DestinationError::Unavailable(format!("invalid connection string: {e}")))?;

    match config.get_ssl_mode() {
        SslMode::Disable => connect_without_tls(config).await,
        SslMode::Prefer => match connect_with_tls(config.clone()).await {
            Ok(client) => Ok(client),
            Err(error) => {
                warn!(%error, "Postgres TLS handshake failed, retrying without TLS");
                connect_without_tls(config).await
            }
        },
        _ => connect_with_tls(config).await,
    }
}

async fn connect_with_tls(config: Config) -> Result<Client, DestinationError> {
    let connector = TlsConnector::builder()
        .build()
        .map_err(|e| DestinationError::Unavailable(e.to_string()))?;
    let tls = MakeTlsConnector::new(connector);
    let (client, connection) = config.connect(tls).await.map_err(db_error)?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(%err, "Postgres connection error");
        }
    });
    Ok(client)
}

async fn connect_without_tls(config: Config) -> Result<Client, DestinationError> {
    let (client, connection) = config.connect(NoTls).await.map_err(db_error)?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(%err, "Postgres connection error");
        }
    });
    Ok(client)
}

/// Server errors keep their SQLSTATE; anything without one (closed socket,
/// I/O, TLS) means the database could not be reached.
pub fn db_error(err: tokio_postgres::Error) -> DestinationError {
    match err.code() {
        Some(state) => DestinationError::Database {
            code: Some(state.code().to_string()),
            message: err
                .as_db_error()
                .map(|db| db.message().to_string())
                .unwrap_or_else(|| err.to_string()),
        },
        None => DestinationError::Unavailable(err.to_string()),
    }
}
