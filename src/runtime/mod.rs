//! Cloud runtime
//!
//! Drives a device's cloud session: connection state machine, fleet
//! provisioning, shadow and jobs protocol, and the queues the application
//! shares with the network.
//!
//! # Tasks
//!
//! Three parties meet at a [`Link`]. Built over a thread-safe `RawMutex`
//! such as `CriticalSectionRawMutex`, it can live in a `static`:
//!
//! - the transport's task pushes incoming messages and connectivity notices;
//! - the application queues publishes and reads its subscriptions;
//! - the [`CloudClient`] task (see [`CloudClient::run`]) moves data between
//!   them and talks to the cloud.
//!
//! Callbacks ([`ShadowHandler`], [`JobHandler`], [`EventHandler`]) run on the
//! client's task, so they must not block.

pub(crate) mod client;
pub(crate) mod link;
pub(crate) mod provisioning;
pub(crate) mod registry;
pub(crate) mod traits;

pub use client::{CloudClient, MAX_PUBLISH_RETRY};
pub use link::{Link, MAX_NOTICES, MAX_PUB_MSGS, MAX_SUB_MSGS};
pub use provisioning::{OWNERSHIP_TOKEN_LEN, PROVISION_RESPONSE_LEN, ProvisionError, provision};
pub use registry::{MAX_SUBSCRIBE_TOPICS, TopicRegistry};
pub use traits::{EventHandler, JobHandler, NoopHandler, ShadowHandler};
