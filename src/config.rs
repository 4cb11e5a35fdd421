//! # Client Configuration
//!
//! [`CloudConfig`] gathers everything the client needs before `init`: the
//! broker endpoint, credential material as borrowed PEM text, queue depths and
//! registry limits, and the reconnection policy. Nothing is copied; the
//! configuration only borrows, so credentials can live in flash.
//!
//! ```ignore
//! let config = CloudConfig::new("abc123-ats.iot.eu-west-1.amazonaws.com", 8883, ROOT_CA)
//!     .with_thing_credentials("kitchen-sensor", DEVICE_CERT, DEVICE_KEY)
//!     .with_queue_depths(10, 10);
//! config.validate()?;
//! ```

use embassy_time::Duration;
use heapless::Vec;

use crate::error::ConfigError;
use crate::jobs::MAX_JOBS;
use crate::runtime::{MAX_PUB_MSGS, MAX_SUB_MSGS, MAX_SUBSCRIBE_TOPICS};
use crate::shadow::MAX_SHADOWS;

/// Maximum length of the broker host name.
pub const HOST_LEN: usize = 128;

/// Maximum length of a thing name.
pub const THING_NAME_LEN: usize = 32;

/// Maximum size of the root CA certificate, in bytes.
pub const ROOT_CA_LEN: usize = 1300;

/// Maximum size of a device or claim certificate, in bytes.
pub const CERTIFICATE_LEN: usize = 1400;

/// Maximum size of a device or claim private key, in bytes.
pub const PRIVATE_KEY_LEN: usize = 1800;

/// Maximum length of a provisioning template name.
pub const TEMPLATE_NAME_LEN: usize = 64;

/// Maximum length of a device serial number.
pub const SERIAL_NUMBER_LEN: usize = 32;

/// Number of steps a [`ReconnectConfig`] backoff pattern can hold.
pub const BACKOFF_STEPS: usize = 8;

/// Claim credentials used for fleet provisioning.
#[derive(Debug, Clone, Copy)]
pub struct ClaimCredentials<'a> {
    pub template: &'a str,
    pub certificate: &'a str,
    pub private_key: &'a str,
    /// Passed to the template as the `SerialNumber` parameter.
    pub serial_number: &'a str,
}

/// Device identity used to open the broker session.
#[derive(Debug, Clone, Copy)]
pub struct ThingCredentials<'a> {
    pub thing_name: &'a str,
    pub certificate: &'a str,
    pub private_key: &'a str,
}

/// Reconnection policy.
///
/// Attempt `n` (1-based) waits `backoff_pattern[n - 1]`, or `sustained_delay`
/// once the pattern runs out.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive failed attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
    pub backoff_pattern: Vec<Duration, BACKOFF_STEPS>,
    pub sustained_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        let mut backoff_pattern = Vec::new();
        for secs in [1, 2, 5, 10, 30] {
            // five steps always fit
            let _ = backoff_pattern.push(Duration::from_secs(secs));
        }
        Self {
            max_attempts: Some(10),
            backoff_pattern,
            sustained_delay: Duration::from_secs(60),
        }
    }
}

impl ReconnectConfig {
    /// Delay before the given attempt.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }

    /// `true` once `failures` consecutive attempts used up the budget.
    pub fn is_exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|max| failures >= max)
    }
}

/// Configuration of a [`CloudClient`](crate::runtime::CloudClient).
#[derive(Debug, Clone)]
pub struct CloudConfig<'a> {
    pub host: &'a str,
    pub port: u16,
    pub root_ca: &'a str,
    /// Identity supplied directly; takes precedence over storage.
    pub thing: Option<ThingCredentials<'a>>,
    /// Claim material used when no identity exists yet.
    pub claim: Option<ClaimCredentials<'a>>,
    pub max_pub_msg_to_store: u8,
    pub max_sub_msg_to_store: u8,
    pub max_subscribe_topics: u8,
    pub max_jobs: u8,
    pub max_shadows: u8,
    pub reconnect: ReconnectConfig,
    /// Upper bound for each provisioning request.
    pub provision_timeout: Duration,
    /// Polling period of the run loop.
    pub tick: Duration,
}

impl<'a> CloudConfig<'a> {
    /// Creates a configuration with default limits and no credentials.
    pub fn new(host: &'a str, port: u16, root_ca: &'a str) -> Self {
        Self {
            host,
            port,
            root_ca,
            thing: None,
            claim: None,
            max_pub_msg_to_store: MAX_PUB_MSGS as u8,
            max_sub_msg_to_store: MAX_SUB_MSGS as u8,
            max_subscribe_topics: MAX_SUBSCRIBE_TOPICS as u8,
            max_jobs: MAX_JOBS as u8,
            max_shadows: MAX_SHADOWS as u8,
            reconnect: ReconnectConfig::default(),
            provision_timeout: Duration::from_secs(30),
            tick: Duration::from_millis(200),
        }
    }

    pub fn with_thing_credentials(mut self, thing_name: &'a str, certificate: &'a str, private_key: &'a str) -> Self {
        self.thing = Some(ThingCredentials {
            thing_name,
            certificate,
            private_key,
        });
        self
    }

    pub fn with_claim(mut self, claim: ClaimCredentials<'a>) -> Self {
        self.claim = Some(claim);
        self
    }

    /// Sets the publish and subscribe queue depths.
    pub fn with_queue_depths(mut self, publish: u8, subscribe: u8) -> Self {
        self.max_pub_msg_to_store = publish;
        self.max_sub_msg_to_store = subscribe;
        self
    }

    pub fn with_max_subscribe_topics(mut self, topics: u8) -> Self {
        self.max_subscribe_topics = topics;
        self
    }

    pub fn with_max_jobs(mut self, jobs: u8) -> Self {
        self.max_jobs = jobs;
        self
    }

    pub fn with_max_shadows(mut self, shadows: u8) -> Self {
        self.max_shadows = shadows;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_provision_timeout(mut self, timeout: Duration) -> Self {
        self.provision_timeout = timeout;
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Checks every documented bound.
    ///
    /// Whether some identity will be available is checked separately at start,
    /// since it may come from storage.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::MissingHost);
        }
        if self.host.len() > HOST_LEN {
            return Err(ConfigError::HostTooLong);
        }
        if self.root_ca.is_empty() {
            return Err(ConfigError::MissingRootCa);
        }
        if self.root_ca.len() > ROOT_CA_LEN {
            return Err(ConfigError::RootCaTooLong);
        }

        if let Some(thing) = &self.thing {
            if thing.thing_name.is_empty() || thing.certificate.is_empty() || thing.private_key.is_empty() {
                return Err(ConfigError::IncompleteThingCredentials);
            }
            if thing.thing_name.len() > THING_NAME_LEN {
                return Err(ConfigError::ThingNameTooLong);
            }
            check_key_material(thing.certificate, thing.private_key)?;
        }
        if let Some(claim) = &self.claim {
            if claim.template.is_empty() || claim.template.len() > TEMPLATE_NAME_LEN {
                return Err(ConfigError::InvalidTemplateName);
            }
            if claim.serial_number.is_empty() || claim.serial_number.len() > SERIAL_NUMBER_LEN {
                return Err(ConfigError::InvalidSerialNumber);
            }
            check_key_material(claim.certificate, claim.private_key)?;
        }

        check_depth(self.max_pub_msg_to_store, MAX_PUB_MSGS, ConfigError::PublishQueueDepth)?;
        check_depth(self.max_sub_msg_to_store, MAX_SUB_MSGS, ConfigError::SubscribeQueueDepth)?;
        check_depth(self.max_jobs, MAX_JOBS, ConfigError::JobLimit)?;
        check_depth(self.max_shadows, MAX_SHADOWS, ConfigError::ShadowLimit)?;
        if usize::from(self.max_subscribe_topics) > MAX_SUBSCRIBE_TOPICS {
            return Err(ConfigError::SubscribeTopics(self.max_subscribe_topics));
        }
        if self.tick == Duration::from_ticks(0) {
            return Err(ConfigError::ZeroTick);
        }
        Ok(())
    }
}

fn check_key_material(certificate: &str, private_key: &str) -> Result<(), ConfigError> {
    if certificate.is_empty() || private_key.is_empty() {
        return Err(ConfigError::MissingCredentials);
    }
    if certificate.len() > CERTIFICATE_LEN {
        return Err(ConfigError::CertificateTooLong);
    }
    if private_key.len() > PRIVATE_KEY_LEN {
        return Err(ConfigError::PrivateKeyTooLong);
    }
    Ok(())
}

fn check_depth(value: u8, max: usize, err: fn(u8) -> ConfigError) -> Result<(), ConfigError> {
    if value == 0 || usize::from(value) > max {
        return Err(err(value));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CA: &str = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";

    fn base<'a>() -> CloudConfig<'a> {
        CloudConfig::new("example-ats.iot.eu-west-1.amazonaws.com", 8883, CA)
    }

    #[test]
    fn defaults_are_valid() {
        let config = base();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.tick, Duration::from_millis(200));
    }

    #[test]
    fn endpoint_and_ca_are_required() {
        assert_eq!(CloudConfig::new("", 8883, CA).validate(), Err(ConfigError::MissingHost));
        assert_eq!(
            CloudConfig::new("host", 8883, "").validate(),
            Err(ConfigError::MissingRootCa)
        );
        let big_ca = "A".repeat(ROOT_CA_LEN + 1);
        assert_eq!(
            CloudConfig::new("host", 8883, &big_ca).validate(),
            Err(ConfigError::RootCaTooLong)
        );
    }

    #[test]
    fn credential_bounds() {
        let key = "K".repeat(PRIVATE_KEY_LEN + 1);
        assert_eq!(
            base().with_thing_credentials("dev", "cert", &key).validate(),
            Err(ConfigError::PrivateKeyTooLong)
        );
        assert_eq!(
            base().with_thing_credentials("", "cert", "key").validate(),
            Err(ConfigError::IncompleteThingCredentials)
        );
        assert_eq!(
            base()
                .with_thing_credentials("a-thing-name-that-is-way-too-long", "cert", "key")
                .validate(),
            Err(ConfigError::ThingNameTooLong)
        );
        let claim = ClaimCredentials {
            template: "",
            certificate: "cert",
            private_key: "key",
            serial_number: "SN1",
        };
        assert_eq!(
            base().with_claim(claim).validate(),
            Err(ConfigError::InvalidTemplateName)
        );
    }

    #[test]
    fn queue_depths_are_bounded() {
        assert_eq!(
            base().with_queue_depths(0, 5).validate(),
            Err(ConfigError::PublishQueueDepth(0))
        );
        assert_eq!(
            base().with_queue_depths(5, 200).validate(),
            Err(ConfigError::SubscribeQueueDepth(200))
        );
        assert_eq!(
            base().with_max_jobs(6).validate(),
            Err(ConfigError::JobLimit(6))
        );
        assert_eq!(
            base().with_tick(Duration::from_ticks(0)).validate(),
            Err(ConfigError::ZeroTick)
        );
    }

    #[test]
    fn backoff_follows_pattern_then_sustains() {
        let reconnect = ReconnectConfig::default();
        assert_eq!(reconnect.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(reconnect.backoff_delay(5), Duration::from_secs(30));
        assert_eq!(reconnect.backoff_delay(6), Duration::from_secs(60));
        assert!(!reconnect.is_exhausted(9));
        assert!(reconnect.is_exhausted(10));

        let forever = ReconnectConfig {
            max_attempts: None,
            ..ReconnectConfig::default()
        };
        assert!(!forever.is_exhausted(u32::MAX));
    }
}
