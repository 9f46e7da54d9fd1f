use super::build_response;
use crate::observer::ConcurrentObserver;
use std::sync::Arc;
use warp::Filter;

pub fn routes(
    observer: &Arc<ConcurrentObserver>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    publish_test(observer.clone())
}

/// GET /test
///
/// Publishes a greeting to the broker, to check the round trip
/// through the `/mqtt` log route
fn publish_test(
    observer: Arc<ConcurrentObserver>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || observer.clone())
        .and(warp::get())
        .and(warp::path("test"))
        .and(warp::path::end())
        .and_then(|observer: Arc<ConcurrentObserver>| async move {
            let resp = observer
                .publish_test_message()
                .await
                .map(|_| dto::PublishResponseDto {
                    result: true,
                    message: "Published".to_owned(),
                });
            build_response(resp)
        })
        .boxed()
}

pub mod dto {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    pub struct PublishResponseDto {
        pub result: bool,
        pub message: String,
    }
}
