//! HTTP surface of the chat core: a health check and the SSE transport that
//! attaches devices to the connection registry.

use log::*;
use service::AppState;
use tokio::net::TcpListener;

mod controller;
pub mod error;
mod extractors;
pub mod router;
mod sse;

pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let interface = app_state
        .config
        .interface
        .clone()
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let server_url = format!("{}:{}", interface, app_state.config.port);

    let listener = TcpListener::bind(&server_url).await?;
    info!(
        "Server starting... listening for connections on http://{} ({})",
        server_url,
        app_state.config.runtime_env()
    );

    axum::serve(listener, router::define_routes(app_state)).await
}
