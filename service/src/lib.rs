use config::{Config, ConfigError};
use delivery::broker::MemoryBroker;
use delivery::{ConnectionRegistry, DeliveryEventHandler, QueueBridge, Router};
use events::EventPublisher;
use log::info;
use std::sync::Arc;

pub mod config;
pub mod logging;

// Service-level state shared by every request handler.
// Needs to implement Clone to be able to be passed into the axum Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub registry: Arc<ConnectionRegistry>,
    pub router: Arc<Router>,
    /// Publishes committed workflow events; the delivery handler is registered.
    pub event_publisher: EventPublisher,
}

impl AppState {
    /// Wire the delivery core from configuration: registry, offline queues on
    /// the in-process broker, router and the domain event handler.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let sealer = config.sealer()?;

        let registry = Arc::new(ConnectionRegistry::new(
            config.max_connections_per_device,
            config.connection_buffer_size,
        ));
        let queue = QueueBridge::new(Arc::new(MemoryBroker::new()))
            .with_prefix(config.offline_queue_prefix.clone())
            .with_sealer(sealer.clone());
        let router = Arc::new(
            Router::new(registry.clone(), queue)
                .with_sealer(sealer)
                .with_write_timeout(config.write_timeout())
                .with_system_users(config.system_user_ids.clone()),
        );
        let event_publisher = EventPublisher::new()
            .with_handler(Arc::new(DeliveryEventHandler::new(router.clone())));

        info!(
            "Delivery core ready: {} connection(s) per device, sealing {}",
            config.max_connections_per_device,
            if config.seal_enabled { "on" } else { "off" }
        );

        Ok(Self {
            config,
            registry,
            router,
            event_publisher,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use delivery::{DeviceClass, EventKind};
    use events::{DomainEvent, Recipient};
    use serde_json::json;

    fn config(args: &[&str]) -> Config {
        let mut argv = vec!["chat_core"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[tokio::test]
    async fn published_events_reach_live_connections() {
        let state = AppState::new(config(&[])).unwrap();
        let mut attached = state.registry.attach("bob", DeviceClass::Web).unwrap();

        state
            .event_publisher
            .publish(DomainEvent::FriendRequestSent {
                request: json!({ "id": "r1" }),
                sender_id: "alice".to_string(),
                recipients: vec![Recipient::loud("bob")],
            })
            .await;

        let envelope = attached.receiver.recv().await.unwrap();
        assert_eq!(envelope.kind, EventKind::FriendRequest);
        assert_eq!(envelope.sender_id.as_deref(), Some("alice"));
    }

    #[test]
    fn invalid_config_is_refused() {
        assert!(AppState::new(config(&["--seal-enabled"])).is_err());
    }

    #[test]
    fn registry_capacity_follows_config() {
        let state = AppState::new(config(&["--max-connections-per-device", "1"])).unwrap();
        let _first = state.registry.attach("bob", DeviceClass::Mobile).unwrap();
        assert!(state.registry.attach("bob", DeviceClass::Mobile).is_err());
    }
}
