//! Webhook delivery (spec §4.8): encrypted secret storage, HMAC request
//! signing, an SSRF guard on outbound URLs, and the delivery worker that
//! ties them to the event bus.

mod crypto;
mod delivery;
mod signature;
mod ssrf;

pub use crypto::{decrypt_secret, encrypt_secret};
pub use delivery::WebhookDeliveryWorker;
pub use signature::sign;
pub use ssrf::guard as ssrf_guard;
