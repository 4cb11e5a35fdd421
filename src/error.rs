//! # Error Types
//!
//! This module defines the error types used throughout the synchronization engine,
//! from configuration mistakes caught at init to resource exhaustion and malformed
//! cloud documents seen at runtime.

use crate::state::InvalidTransition;

/// Configuration problems detected by [`CloudConfig::validate`](crate::config::CloudConfig::validate).
///
/// These are fatal to the client instance: it stays in `Idle` until a valid
/// configuration is supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// The endpoint host name is empty.
    MissingHost,
    /// The endpoint host name does not fit the host buffer.
    HostTooLong,
    /// No root CA certificate was supplied.
    MissingRootCa,
    /// The root CA certificate exceeds the documented maximum.
    RootCaTooLong,
    /// The configured thing name exceeds the documented maximum.
    ThingNameTooLong,
    /// A device or claim certificate exceeds the documented maximum.
    CertificateTooLong,
    /// A device or claim private key exceeds the documented maximum.
    PrivateKeyTooLong,
    /// Only part of the thing name / certificate / private key triple was supplied.
    IncompleteThingCredentials,
    /// Neither device credentials, claim credentials nor a stored identity exist.
    MissingCredentials,
    /// The provisioning template name is empty or too long.
    InvalidTemplateName,
    /// The provisioning serial number is empty or too long.
    InvalidSerialNumber,
    /// The publish queue depth is zero or above the compiled maximum.
    PublishQueueDepth(u8),
    /// The subscribe queue depth is zero or above the compiled maximum.
    SubscribeQueueDepth(u8),
    /// The subscribe topic limit is above the compiled maximum.
    SubscribeTopics(u8),
    /// The job limit is zero or above the compiled maximum.
    JobLimit(u8),
    /// The shadow limit is zero or above the compiled maximum.
    ShadowLimit(u8),
    /// The polling tick is zero.
    ZeroTick,
}

/// Errors returned by the bounded queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QueueError {
    /// The queue holds `capacity` unread elements; the write was rejected.
    Full,
    /// The requested capacity is zero or larger than the backing store.
    InvalidCapacity(usize),
    /// The queue must be empty before it can be resized.
    NotEmpty,
}

/// Errors raised while building a [`Message`](crate::message::Message).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageError {
    /// The topic is empty.
    EmptyTopic,
    /// The topic does not fit the topic buffer.
    TopicTooLong,
    /// The payload does not fit the payload buffer.
    PayloadTooLong,
}

/// Errors raised by the shadow registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ShadowError {
    /// A table with the same name is already registered.
    DuplicateName,
    /// A classic (unnamed) table is already registered.
    DuplicateClassic,
    /// The shadow name does not fit the name buffer.
    NameTooLong,
    /// The table declares more elements than a shadow can hold.
    TooManyElements(usize),
    /// Two elements of one table share a key.
    DuplicateKey,
    /// An element key does not fit the key buffer.
    KeyTooLong,
    /// The configured number of shadows is already registered.
    RegistryFull,
    /// No table is registered under this index.
    UnknownShadow(usize),
    /// The table has no element with this key.
    UnknownKey,
    /// The value does not match the element's declared type.
    TypeMismatch,
    /// A text value does not fit the value buffer.
    ValueTooLong,
    /// The rendered document does not fit a message payload.
    DocumentTooLarge,
    /// An incoming shadow document could not be decoded.
    MalformedDocument,
}

/// Errors raised by the jobs registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum JobError {
    /// A handler is already registered for this action.
    DuplicateAction,
    /// The configured number of jobs is already registered.
    RegistryFull,
    /// The action name is empty or does not fit the action buffer.
    InvalidAction,
    /// No handler is registered for the job's action.
    UnknownAction,
    /// The action already has a different job in flight.
    Busy,
    /// The job id does not fit the id buffer.
    IdTooLong,
    /// The job notification could not be understood.
    MalformedNotification,
}

/// The primary error enum of the cloud client.
///
/// It is generic over the transport error type `E`, allowing it to wrap the
/// specific errors of the MQTT/TLS collaborator.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClientError<E> {
    /// An error occurred in the transport collaborator.
    Transport(E),
    /// The configuration is invalid.
    Config(ConfigError),
    /// A bounded queue rejected the operation.
    Queue(QueueError),
    /// A message could not be built.
    Message(MessageError),
    /// The shadow registry rejected the operation.
    Shadow(ShadowError),
    /// The jobs registry rejected the operation.
    Job(JobError),
    /// The requested state change is not allowed from the current state.
    Transition(InvalidTransition),
    /// Registrations are only accepted before the client is started.
    RegistrationClosed,
    /// The subscribe topic registry is full.
    TooManyTopics,
    /// The client is not connected to the cloud.
    NotConnected,
}

impl<E> From<ConfigError> for ClientError<E> {
    fn from(err: ConfigError) -> Self {
        ClientError::Config(err)
    }
}

impl<E> From<QueueError> for ClientError<E> {
    fn from(err: QueueError) -> Self {
        ClientError::Queue(err)
    }
}

impl<E> From<MessageError> for ClientError<E> {
    fn from(err: MessageError) -> Self {
        ClientError::Message(err)
    }
}

impl<E> From<ShadowError> for ClientError<E> {
    fn from(err: ShadowError) -> Self {
        ClientError::Shadow(err)
    }
}

impl<E> From<JobError> for ClientError<E> {
    fn from(err: JobError) -> Self {
        ClientError::Job(err)
    }
}

impl<E> From<InvalidTransition> for ClientError<E> {
    fn from(err: InvalidTransition) -> Self {
        ClientError::Transition(err)
    }
}
