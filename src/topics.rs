//! Reserved topic layout of the cloud service.
//!
//! Builders write into a caller-owned `String<MAX_TOPIC_LEN>`; [`classify`]
//! maps an incoming topic back to the subsystem that handles it.

use core::fmt::Write;

use heapless::String;

use crate::error::MessageError;
use crate::message::MAX_TOPIC_LEN;

pub type Topic = String<MAX_TOPIC_LEN>;

/// Shadow operations with their own topic suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ShadowOp {
    Update,
    UpdateDelta,
    Get,
    GetAccepted,
}

impl ShadowOp {
    fn suffix(self) -> &'static str {
        match self {
            ShadowOp::Update => "update",
            ShadowOp::UpdateDelta => "update/delta",
            ShadowOp::Get => "get",
            ShadowOp::GetAccepted => "get/accepted",
        }
    }
}

fn build(args: core::fmt::Arguments<'_>) -> Result<Topic, MessageError> {
    let mut topic = Topic::new();
    topic.write_fmt(args).map_err(|_| MessageError::TopicTooLong)?;
    Ok(topic)
}

/// `$aws/things/<thing>/shadow[/name/<name>]/<op>`
pub fn shadow(thing: &str, name: Option<&str>, op: ShadowOp) -> Result<Topic, MessageError> {
    match name {
        Some(name) => build(format_args!(
            "$aws/things/{}/shadow/name/{}/{}",
            thing,
            name,
            op.suffix()
        )),
        None => build(format_args!("$aws/things/{}/shadow/{}", thing, op.suffix())),
    }
}

/// `$aws/things/<thing>/jobs/notify-next`
pub fn jobs_notify_next(thing: &str) -> Result<Topic, MessageError> {
    build(format_args!("$aws/things/{}/jobs/notify-next", thing))
}

/// `$aws/things/<thing>/jobs/$next/get`
pub fn jobs_next_get(thing: &str) -> Result<Topic, MessageError> {
    build(format_args!("$aws/things/{}/jobs/$next/get", thing))
}

/// `$aws/things/<thing>/jobs/$next/get/accepted`
pub fn jobs_next_get_accepted(thing: &str) -> Result<Topic, MessageError> {
    build(format_args!("$aws/things/{}/jobs/$next/get/accepted", thing))
}

/// `$aws/things/<thing>/jobs/<job_id>/update`
pub fn job_update(thing: &str, job_id: &str) -> Result<Topic, MessageError> {
    build(format_args!("$aws/things/{}/jobs/{}/update", thing, job_id))
}

/// Fleet provisioning: request a new key pair and certificate.
pub const CREATE_KEYS_AND_CERTIFICATE: &str = "$aws/certificates/create/json";

/// Fleet provisioning: register the thing through `template`.
pub fn register_thing(template: &str) -> Result<Topic, MessageError> {
    build(format_args!("$aws/provisioning-templates/{}/provision/json", template))
}

/// Where an incoming message belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'t> {
    /// `update/delta` of the classic (`None`) or a named shadow.
    ShadowDelta(Option<&'t str>),
    /// `get/accepted` of the classic (`None`) or a named shadow.
    ShadowGetAccepted(Option<&'t str>),
    JobNotify,
    JobNextAccepted,
    /// Any other reserved topic, such as `update/accepted` echoes. Only
    /// delivered when the application subscribed to it.
    System,
    /// Not a reserved topic; delivered to the application.
    Application,
}

/// Classifies `topic` relative to this device's `thing` name.
pub fn classify<'t>(thing: &str, topic: &'t str) -> Route<'t> {
    if !topic.starts_with('$') {
        return Route::Application;
    }
    let Some(rest) = topic
        .strip_prefix("$aws/things/")
        .and_then(|r| r.strip_prefix(thing))
        .and_then(|r| r.strip_prefix('/'))
    else {
        return Route::System;
    };

    if let Some(shadow) = rest.strip_prefix("shadow/") {
        let (name, op) = match shadow.strip_prefix("name/") {
            Some(named) => match named.split_once('/') {
                Some((name, op)) => (Some(name), op),
                None => return Route::System,
            },
            None => (None, shadow),
        };
        return match op {
            "update/delta" => Route::ShadowDelta(name),
            "get/accepted" => Route::ShadowGetAccepted(name),
            _ => Route::System,
        };
    }
    match rest {
        "jobs/notify-next" => Route::JobNotify,
        "jobs/$next/get/accepted" => Route::JobNextAccepted,
        _ => Route::System,
    }
}
