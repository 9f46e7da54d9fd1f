use super::build_response;
use crate::observer::ConcurrentObserver;
use std::sync::Arc;
use warp::Filter;

pub fn routes(
    observer: &Arc<ConcurrentObserver>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    health(observer.clone())
}

fn health(
    observer: Arc<ConcurrentObserver>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || observer.clone())
        .and(warp::get())
        .and(warp::path!("api" / "health"))
        .and_then(|observer: Arc<ConcurrentObserver>| async move {
            let mqtt_connected = observer.is_mqtt_connected();
            let database_state = observer.database_state().await;
            let known_devices = observer.known_devices().await;
            let ret = dto::HealthyDto {
                healthy: mqtt_connected && database_state == "connected",
                mqtt_connected,
                database_state,
                known_devices,
                version: fastscale_core::CORE_VERSION.to_owned(),
            };
            build_response(Ok(ret))
        })
        .boxed()
}

pub mod dto {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    pub struct HealthyDto {
        pub healthy: bool,
        pub mqtt_connected: bool,
        pub database_state: String,
        pub known_devices: usize,
        pub version: String,
    }
}
