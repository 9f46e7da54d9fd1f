use std::sync::Arc;

use fastscale_core::{EnviroSensor, Record};

use super::*;
use crate::config::Config;
use crate::models::{memory::MemoryStore, Store};

fn build_mocked_observer(store: Arc<MemoryStore>) -> Arc<ConcurrentObserver> {
    let config = Config::from_vars([
        ("DATABASE_URL", "postgres://localhost/fastscale"),
        ("MQTT_BROKERS", "127.0.0.1:1"),
        ("MQTT_TIMEOUT_MS", "500"),
    ])
    .unwrap();
    ConcurrentObserver::new(Arc::new(config), store).unwrap()
}

#[tokio::test]
async fn test_publish() {
    // prepare
    let observer = build_mocked_observer(Arc::new(MemoryStore::new()));
    let filter = routes(&observer);

    // execute
    let res = warp::test::request()
        .method("GET")
        .path("/test")
        .reply(&filter)
        .await;

    // validate
    assert_eq!(200, res.status());
    let body: publish_routes::dto::PublishResponseDto = serde_json::from_slice(res.body()).unwrap();
    assert!(body.result);
    assert_eq!("Published", body.message);
}

#[tokio::test]
async fn test_publish_without_broker() {
    // prepare
    let observer = build_mocked_observer(Arc::new(MemoryStore::new()));
    observer.close_eventloop().await;
    let filter = routes(&observer);

    // execute
    let res = warp::test::request()
        .method("GET")
        .path("/test")
        .reply(&filter)
        .await;

    // validate
    assert_eq!(500, res.status());
    serde_json::from_slice::<dto::ErrorResponseDto>(res.body()).unwrap();
}

#[tokio::test]
async fn test_health() {
    // prepare
    let store = Arc::new(MemoryStore::new());
    store
        .insert(&Record::EnviroSensor(EnviroSensor {
            uid: "abc123".to_owned(),
            nickname: "plant1".to_owned(),
            model: "grow".to_owned(),
            location: None,
        }))
        .await
        .unwrap();
    let observer = build_mocked_observer(store.clone());
    observer.prepare_storage().await.unwrap();
    let filter = routes(&observer);

    // execute
    let res = warp::test::request()
        .method("GET")
        .path("/api/health")
        .reply(&filter)
        .await;

    // validate
    assert_eq!(200, res.status());
    let body: metric_routes::dto::HealthyDto = serde_json::from_slice(res.body()).unwrap();
    assert!(!body.healthy);
    assert!(!body.mqtt_connected);
    assert_eq!("connected", body.database_state);
    assert_eq!(1, body.known_devices);
}

#[tokio::test]
async fn test_health_loads_devices_lazily() {
    // prepare
    let store = Arc::new(MemoryStore::new());
    for uid in ["dev1", "dev2"] {
        store
            .insert(&Record::EnviroSensor(EnviroSensor {
                uid: uid.to_owned(),
                nickname: "plant".to_owned(),
                model: "grow".to_owned(),
                location: None,
            }))
            .await
            .unwrap();
    }
    let observer = build_mocked_observer(store);

    // execute
    let res = warp::test::request()
        .method("GET")
        .path("/api/health")
        .reply(&routes(&observer))
        .await;

    // validate
    let body: metric_routes::dto::HealthyDto = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(2, body.known_devices);
}

#[tokio::test]
async fn test_health_database_down() {
    // prepare
    let store = Arc::new(MemoryStore::new());
    store.set_unavailable(true);
    let observer = build_mocked_observer(store);
    let filter = routes(&observer);

    // execute
    let res = warp::test::request()
        .method("GET")
        .path("/api/health")
        .reply(&filter)
        .await;

    // validate
    let body: metric_routes::dto::HealthyDto = serde_json::from_slice(res.body()).unwrap();
    assert!(body.database_state.starts_with("unavailable"));
    assert_eq!(0, body.known_devices);
}

#[tokio::test]
async fn test_unknown_path() {
    let observer = build_mocked_observer(Arc::new(MemoryStore::new()));

    let res = warp::test::request()
        .method("GET")
        .path("/api/sensor")
        .reply(&routes(&observer))
        .await;

    assert_eq!(404, res.status());
}
