//! # Device-Cloud Synchronization for Embedded Systems
//!
//! `myrtio-cloud` keeps a device's state in step with a cloud shadow, jobs and
//! pub/sub service over a constrained MQTT link. It is `no_std`, allocates
//! nothing and builds on the [Embassy](https://embassy.dev/) async ecosystem.
//!
//! ## Core Features
//!
//! - **Bounded memory:** every queue, registry and document buffer has a
//!   compile-time ceiling and a configurable runtime limit below it.
//! - **Shadows:** a classic shadow plus named shadows of typed key/value
//!   elements. Deltas from the cloud are applied and reported to a callback;
//!   device-side changes are batched into one update document per table.
//! - **Jobs:** handlers registered per job action, with in-flight bookkeeping
//!   and per-action timeouts.
//! - **Connection lifecycle:** fleet provisioning by claim, reconnection with
//!   bounded backoff, suspend and resume.
//! - **Transport agnostic:** MQTT framing and TLS live behind the
//!   [`CloudTransport`] trait; persistence behind [`DeviceStorage`].
//!
//! ## Usage
//!
//! ```ignore
//! use myrtio_cloud::{CloudClient, CloudConfig, Link, ShadowElement, ShadowValue};
//!
//! static LINK: Link<CriticalSectionRawMutex> = Link::new();
//!
//! let config = CloudConfig::new("example.iot.amazonaws.com", 8883, ROOT_CA)
//!     .with_thing_credentials("kitchen-sensor", CERT, KEY);
//! let elements = [ShadowElement::new("led", ShadowValue::Integer(0))?];
//!
//! let mut client = CloudClient::new(config, &LINK, transport, MemoryStorage::new());
//! client.register_shadow(None, &elements, &|_, key: &str, value: &ShadowValue| {
//!     // drive the LED
//! })?;
//! client.init()?;
//! client.start()?;
//! client.run().await;
//! ```

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod config;
pub mod error;
pub mod event;
pub mod jobs;
pub mod message;
pub mod ring_buffer;
pub mod runtime;
pub mod shadow;
pub mod state;
pub mod storage;
pub mod topics;
pub mod transport;

// Re-export key types for easier access at the crate root.
pub use config::{ClaimCredentials, CloudConfig, ReconnectConfig, ThingCredentials};
pub use error::ClientError;
pub use event::{Event, Notice};
pub use jobs::{Job, JobDocument, JobStatus};
pub use message::{Message, QoS};
pub use runtime::{CloudClient, EventHandler, JobHandler, Link, NoopHandler, ShadowHandler};
pub use shadow::{DeltaSection, ShadowElement, ShadowField, ShadowValue, UpdateKind};
pub use state::ConnectionState;
pub use storage::{DeviceStorage, Identity, MemoryStorage};
pub use transport::{CloudTransport, Session};
