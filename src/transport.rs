//! # Cloud Transport Abstraction
//!
//! This module defines the `CloudTransport` trait, the outgoing half of the
//! MQTT/TLS collaborator. The client never frames packets or performs a TLS
//! handshake itself; it asks the transport to open a session, subscribe and
//! publish. The incoming half (message arrival, disconnects) is delivered by
//! the transport's own task into the shared [`Link`](crate::runtime::Link).
//!
//! With the Rust 2024 Edition, this trait uses native `async fn`, removing the
//! need for the `#[async_trait]` macro.

use embassy_time::Duration;

use crate::message::QoS;

/// Everything needed to open a mutually authenticated broker session.
#[derive(Debug, Clone, Copy)]
pub struct Session<'a> {
    pub host: &'a str,
    pub port: u16,
    /// MQTT client id; the thing name, or the serial number while provisioning.
    pub client_id: &'a str,
    pub root_ca: &'a str,
    pub certificate: &'a str,
    pub private_key: &'a str,
}

/// Outcome of a request/reply exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reply {
    /// `true` if the reply arrived on `<topic>/accepted`, `false` for
    /// `<topic>/rejected`.
    pub accepted: bool,
    /// Number of bytes written to the response buffer.
    pub len: usize,
}

/// A trait representing the MQTT/TLS collaborator.
#[allow(async_fn_in_trait)]
pub trait CloudTransport {
    /// The error type returned by the transport.
    #[cfg(not(feature = "defmt"))]
    type Error: core::fmt::Debug;
    #[cfg(feature = "defmt")]
    type Error: core::fmt::Debug + defmt::Format;

    /// Opens a session. Returns once the broker acknowledged the connection.
    async fn connect(&mut self, session: &Session<'_>) -> Result<(), Self::Error>;

    /// Closes the session if one is open.
    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Self::Error>;

    async fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Result<(), Self::Error>;

    /// Publishes `payload` to `topic` and waits up to `timeout` for the reply
    /// on `<topic>/accepted` or `<topic>/rejected`, copying it into `response`.
    ///
    /// Used for provisioning, whose replies exceed the message payload size.
    async fn request(
        &mut self,
        topic: &str,
        payload: &[u8],
        response: &mut [u8],
        timeout: Duration,
    ) -> Result<Reply, Self::Error>;
}

impl<T: CloudTransport> CloudTransport for &mut T {
    type Error = T::Error;

    async fn connect(&mut self, session: &Session<'_>) -> Result<(), Self::Error> {
        (**self).connect(session).await
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        (**self).disconnect().await
    }

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Self::Error> {
        (**self).subscribe(topic, qos).await
    }

    async fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Result<(), Self::Error> {
        (**self).publish(topic, payload, qos, retain).await
    }

    async fn request(
        &mut self,
        topic: &str,
        payload: &[u8],
        response: &mut [u8],
        timeout: Duration,
    ) -> Result<Reply, Self::Error> {
        (**self).request(topic, payload, response, timeout).await
    }
}
