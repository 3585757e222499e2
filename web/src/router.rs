use crate::{controller::health_check_controller, sse};
use axum::{routing::get, Router};
use service::AppState;

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(sse_routes(app_state))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn sse_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/events", get(sse::handler::sse_handler))
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use clap::Parser;
    use service::config::Config;
    use tower::ServiceExt;

    fn app_state(args: &[&str]) -> AppState {
        let mut argv = vec!["chat_core"];
        argv.extend_from_slice(args);
        AppState::new(Config::try_parse_from(argv).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let response = define_routes(app_state(&[]))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"healthy");
    }

    #[tokio::test]
    async fn events_require_a_user() {
        let response = define_routes(app_state(&[]))
            .oneshot(
                Request::get("/events?device=web")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn events_reject_unknown_device() {
        let response = define_routes(app_state(&[]))
            .oneshot(
                Request::get("/events?device=toaster")
                    .header("x-user-id", "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn events_attach_and_respect_capacity() {
        let state = app_state(&["--max-connections-per-device", "1"]);
        let routes = define_routes(state.clone());
        let request = || {
            Request::get("/events?device=mobile")
                .header("x-user-id", "alice")
                .body(Body::empty())
                .unwrap()
        };

        let first = routes.clone().oneshot(request()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(state.registry.connection_count(), 1);

        let second = routes.clone().oneshot(request()).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

        drop(first);
        assert_eq!(state.registry.connection_count(), 0);
    }
}
