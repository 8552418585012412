//! Tenant event bus (spec §4.7): the Redis pub/sub layer that carries every
//! stable event type out to the webhook delivery worker and the websocket
//! fan-out router once its outbox row has landed.

mod bus;

pub use bus::{BusEvent, BusSubscription, EventBus, EventPublisher, RecordingEventPublisher};
