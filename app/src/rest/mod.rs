use crate::error::ObserverError;
use crate::observer::ConcurrentObserver;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use warp::http::StatusCode;
use warp::{Filter, Reply};

mod metric_routes;
mod publish_routes;
#[cfg(test)]
mod test;

pub fn routes(
    observer: &Arc<ConcurrentObserver>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    publish_routes::routes(observer)
        .or(metric_routes::routes(observer))
        .with(warp::trace::request())
}

/// Serves the http api until `shutdown` fires
pub async fn dispatch_server_daemon(
    observer: Arc<ConcurrentObserver>,
    mut shutdown: watch::Receiver<bool>,
) {
    let port = observer.config().server_port();
    let signal = async move {
        let _ = shutdown.changed().await;
    };

    let server = warp::serve(routes(&observer));
    match server.try_bind_with_graceful_shutdown(([0, 0, 0, 0], port), signal) {
        Ok((addr, server)) => {
            info!("Starting webserver at: {}", addr);
            server.await;
            info!("Stopped webserver");
        }
        Err(e) => error!("Failed binding webserver on port {}: {}", port, e),
    }
}

fn build_response<T: serde::Serialize>(
    resp: Result<T, ObserverError>,
) -> Result<warp::reply::Response, warp::Rejection> {
    match resp {
        Ok(data) => Ok(warp::reply::json(&data).into_response()),
        Err(ObserverError::User(err)) => {
            warn!("{}", err);
            let body = warp::reply::json(&dto::ErrorResponseDto {
                error: err.to_string(),
            });
            Ok(warp::reply::with_status(body, StatusCode::BAD_REQUEST).into_response())
        }
        Err(ObserverError::Internal(err)) => {
            error!("{}", err);
            let body = warp::reply::json(&dto::ErrorResponseDto {
                error: "Internal server error".to_owned(),
            });
            Ok(warp::reply::with_status(body, StatusCode::INTERNAL_SERVER_ERROR).into_response())
        }
    }
}

pub mod dto {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ErrorResponseDto {
        pub error: String,
    }
}
