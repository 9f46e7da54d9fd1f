mod config;
mod error;
mod logging;
mod models;
mod mqtt;
mod observer;
mod rest;
mod sensor;

use config::Config;
use error::StartupError;
use models::{establish_db_connection, PgStore};
use observer::ConcurrentObserver;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = logging::init(&config) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    let code = match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Startup failed: {}", e);
            ExitCode::FAILURE
        }
    };
    logging::shutdown();
    code
}

async fn run(config: Arc<Config>) -> Result<(), StartupError> {
    let pool = establish_db_connection(&config)
        .await
        .map_err(StartupError::Database)?;
    let store = Arc::new(PgStore::new(pool, &config));

    let observer = ConcurrentObserver::new(config.clone(), store)?;
    observer.start().await?;

    let (shutdown_sender, shutdown_receiver) = watch::channel(false);
    register_sigint_handler(shutdown_sender)?;

    let receive_mqtt_loop =
        ConcurrentObserver::dispatch_mqtt_receive_loop(observer.clone(), shutdown_receiver.clone());
    let server_daemon = rest::dispatch_server_daemon(observer.clone(), shutdown_receiver);
    let _ = tokio::join!(receive_mqtt_loop, server_daemon);

    observer.shutdown().await;
    Ok(())
}

/// First signal starts a graceful shutdown, the second one exits immediately
fn register_sigint_handler(shutdown: watch::Sender<bool>) -> Result<(), StartupError> {
    let mut requested = false;
    ctrlc::set_handler(move || {
        if requested {
            warn!("Force killing");
            std::process::exit(1);
        }
        requested = true;
        info!("Received termination signal, shutting down");
        if shutdown.send(true).is_err() {
            std::process::exit(0);
        }
    })?;
    Ok(())
}
