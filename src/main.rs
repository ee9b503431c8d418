use std::sync::Arc;

use colored::Colorize;
use log::{error, info, warn};
use thiserror::Error;
use upqueue_collab::{
    Collab, Database, DatabaseError, HttpMetadataSource, MemoryDatabase, MetadataSource,
    OfflineMetadataSource, PgDatabase,
};
use upqueue_server::{run_server, ConfigError, ServerConfig, ServerContext};

mod logging;

#[derive(Debug, Error)]
enum UpqueueError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Could not initialize database: {0}")]
    Database(#[from] DatabaseError),

    #[error("Server stopped: {0}")]
    Server(#[from] std::io::Error),
}

impl UpqueueError {
    fn hint(&self) -> String {
        match self {
            UpqueueError::Config(_) => "Check the UPQUEUE_*, DATABASE_URL, YOUTUBE_* and SPOTIFY_* environment variables.".to_string(),
            UpqueueError::Database(_) => "This is a database error. Make sure the postgres instance in DATABASE_URL is running and reachable, or unset it to keep data in memory.".to_string(),
            UpqueueError::Server(_) => "The server could not listen. Make sure UPQUEUE_SERVER_PORT is free.".to_string(),
        }
    }
}

async fn connect(config: &ServerConfig) -> Result<Arc<dyn Database>, UpqueueError> {
    match &config.database_url {
        Some(url) => {
            info!("Connecting to database...");
            let database = PgDatabase::new(url).await?;

            info!("Running migrations...");
            database.migrate().await?;

            Ok(Arc::new(database))
        }
        None => {
            warn!("DATABASE_URL is not set, data is only kept in memory");
            Ok(Arc::new(MemoryDatabase::new()))
        }
    }
}

async fn run() -> Result<(), UpqueueError> {
    let config = ServerConfig::from_env()?;
    let database = connect(&config).await?;

    let source: Arc<dyn MetadataSource> = match HttpMetadataSource::new(config.credentials.clone())
    {
        Ok(source) => Arc::new(source),
        Err(err) => {
            warn!("Metadata lookups are disabled: {}", err);
            Arc::new(OfflineMetadataSource)
        }
    };

    if config.sign_in_secret.is_none() {
        warn!("UPQUEUE_SIGN_IN_SECRET is not set, nobody will be able to sign in");
    }

    let collab = Collab::new(database, source, config.core.clone());
    let context = ServerContext::new(collab, config.sign_in_secret.clone());

    info!("Initialized successfully.");
    run_server(config.port, context).await?;

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = logging::init_logger() {
        eprintln!("Failed to initialize logging: {}", err);
    }

    if let Err(error) = run().await {
        error!("{} Read the error below to troubleshoot the issue. If you think this might be a bug, please report it by making a GitHub issue.", "upqueue failed to start!".bold().red());
        error!("{}", error);
        error!("{}", format!("Hint: {}", error.hint()).dimmed().italic());
    }
}
