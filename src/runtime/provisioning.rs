//! Fleet provisioning by claim.
//!
//! A device that ships with a shared claim certificate trades it for its own
//! identity in two request/reply exchanges:
//!
//! 1. `CreateKeysAndCertificate` returns a fresh certificate, private key and
//!    a one-time ownership token.
//! 2. `RegisterThing` activates the certificate through a provisioning
//!    template and returns the thing name.
//!
//! The caller owns the session: it connects with the claim credentials before
//! calling [`provision`] and reconnects with the issued ones afterwards.

use embassy_time::Duration;
use heapless::String;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::{CERTIFICATE_LEN, ClaimCredentials, PRIVATE_KEY_LEN, THING_NAME_LEN};
use crate::storage::Identity;
use crate::topics;
use crate::transport::CloudTransport;

/// Size of the buffer that receives provisioning replies.
pub const PROVISION_RESPONSE_LEN: usize = 5120;

/// Maximum length of a certificate ownership token.
pub const OWNERSHIP_TOKEN_LEN: usize = 1024;

/// Reasons provisioning can fail.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProvisionError<E> {
    /// An error occurred in the transport collaborator.
    Transport(E),
    /// The service answered on the `rejected` topic.
    Rejected,
    /// A reply is missing a field or is not valid JSON.
    MalformedResponse,
    /// A reply field does not fit its buffer.
    TooLarge,
}

/// Longest string a reply may need unescaped at once.
const UNESCAPE_LEN: usize = max(max(CERTIFICATE_LEN, PRIVATE_KEY_LEN), OWNERSHIP_TOKEN_LEN);

const fn max(a: usize, b: usize) -> usize {
    if a > b { a } else { b }
}

/// Reply to `CreateKeysAndCertificate`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeysAndCertificate {
    certificate_pem: String<CERTIFICATE_LEN>,
    private_key: String<PRIVATE_KEY_LEN>,
    certificate_ownership_token: String<OWNERSHIP_TOKEN_LEN>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterThingRequest<'a> {
    certificate_ownership_token: &'a str,
    parameters: TemplateParameters<'a>,
}

#[derive(Serialize)]
struct TemplateParameters<'a> {
    #[serde(rename = "SerialNumber")]
    serial_number: &'a str,
}

/// Reply to `RegisterThing`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisteredThing {
    thing_name: String<THING_NAME_LEN>,
}

/// Runs both provisioning exchanges and returns the issued identity.
///
/// `response` is scratch space for the replies; the certificate reply alone
/// is several kilobytes.
pub async fn provision<T: CloudTransport>(
    transport: &mut T,
    claim: &ClaimCredentials<'_>,
    timeout: Duration,
    response: &mut [u8],
) -> Result<Identity, ProvisionError<T::Error>> {
    info!("provisioning: requesting keys and certificate");
    let body = exchange(
        transport,
        topics::CREATE_KEYS_AND_CERTIFICATE,
        b"{}",
        response,
        timeout,
    )
    .await?;
    let keys: KeysAndCertificate = decode(body)?;

    let request = RegisterThingRequest {
        certificate_ownership_token: &keys.certificate_ownership_token,
        parameters: TemplateParameters {
            serial_number: claim.serial_number,
        },
    };
    let mut payload = [0u8; OWNERSHIP_TOKEN_LEN + 128];
    let len = serde_json_core::to_slice(&request, &mut payload).map_err(|_| ProvisionError::TooLarge)?;
    let topic = topics::register_thing(claim.template).map_err(|_| ProvisionError::TooLarge)?;

    info!("provisioning: registering thing via template {}", claim.template);
    let body = exchange(transport, &topic, &payload[..len], response, timeout).await?;
    let thing: RegisteredThing = decode(body)?;

    info!("provisioning: issued thing name {}", thing.thing_name.as_str());
    Ok(Identity {
        thing_name: thing.thing_name,
        certificate: keys.certificate_pem,
        private_key: keys.private_key,
    })
}

async fn exchange<'r, T: CloudTransport>(
    transport: &mut T,
    topic: &str,
    payload: &[u8],
    response: &'r mut [u8],
    timeout: Duration,
) -> Result<&'r [u8], ProvisionError<T::Error>> {
    let reply = transport
        .request(topic, payload, response, timeout)
        .await
        .map_err(ProvisionError::Transport)?;
    if !reply.accepted {
        warn!("provisioning request on {} was rejected", topic);
        return Err(ProvisionError::Rejected);
    }
    response
        .get(..reply.len)
        .ok_or(ProvisionError::MalformedResponse)
}

fn decode<R: DeserializeOwned, E>(body: &[u8]) -> Result<R, ProvisionError<E>> {
    let mut scratch = [0u8; UNESCAPE_LEN];
    match serde_json_core::from_slice_escaped::<R>(body, &mut scratch) {
        Ok((reply, _)) => Ok(reply),
        Err(e) => {
            warn!("provisioning reply not understood: {:?}", e);
            Err(ProvisionError::MalformedResponse)
        }
    }
}
