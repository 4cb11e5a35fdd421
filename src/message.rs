//! # Message Envelopes
//!
//! Owned, bounded shapes for the data that crosses the queues: MQTT-like
//! messages and chunked download packets. Lengths are carried explicitly by
//! the `heapless` containers, never by a terminator.

use heapless::{String, Vec};

use crate::error::MessageError;
use crate::ring_buffer::ByteRing;

/// Maximum length of a topic string.
pub const MAX_TOPIC_LEN: usize = 128;

/// Maximum size of a message payload.
pub const MAX_PAYLOAD_LEN: usize = 1024;

/// Maximum size of one download packet.
pub const PACKET_DATA_LEN: usize = 1024;

/// Quality of Service levels supported by the engine.
///
/// QoS 2 is intentionally absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
}

/// A message with inline storage for topic and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    topic: String<MAX_TOPIC_LEN>,
    payload: Vec<u8, MAX_PAYLOAD_LEN>,
    qos: QoS,
    retain: bool,
}

impl Message {
    /// Builds an at-most-once, non-retained message.
    pub fn new(topic: &str, payload: &[u8]) -> Result<Self, MessageError> {
        if topic.is_empty() {
            return Err(MessageError::EmptyTopic);
        }
        let mut owned_topic = String::new();
        owned_topic
            .push_str(topic)
            .map_err(|_| MessageError::TopicTooLong)?;
        let owned_payload =
            Vec::from_slice(payload).map_err(|_| MessageError::PayloadTooLong)?;
        Ok(Self {
            topic: owned_topic,
            payload: owned_payload,
            qos: QoS::AtMostOnce,
            retain: false,
        })
    }

    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The payload as UTF-8 text, if it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.payload).ok()
    }

    pub fn topic_len(&self) -> usize {
        self.topic.len()
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    pub fn qos(&self) -> QoS {
        self.qos
    }

    pub fn retain(&self) -> bool {
        self.retain
    }
}

/// Progress of a chunked download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketStatus {
    #[default]
    Idle,
    InProgress,
    Complete,
    Failed,
}

/// One fragment of a download, with the bookkeeping needed to reassemble it.
#[derive(Debug, Clone, Default)]
pub struct Packet {
    pub expected_size: u32,
    pub received_size: u32,
    pub packet_id: u16,
    pub status: PacketStatus,
    pub data: Vec<u8, PACKET_DATA_LEN>,
}

impl Packet {
    /// Starts a download of `expected_size` bytes. An empty download is
    /// complete right away.
    pub fn begin(expected_size: u32) -> Self {
        let status = if expected_size == 0 {
            PacketStatus::Complete
        } else {
            PacketStatus::InProgress
        };
        Self {
            expected_size,
            status,
            ..Self::default()
        }
    }

    /// Moves the next fragment out of `ring` into `data`.
    ///
    /// Returns the fragment length. The packet id advances for every non-empty
    /// fragment and the status turns `Complete` once `expected_size` bytes have
    /// been seen, or `Failed` if more arrive than announced.
    pub fn fill_from<const N: usize>(&mut self, ring: &mut ByteRing<N>) -> usize {
        if self.status != PacketStatus::InProgress {
            return 0;
        }
        self.data.clear();
        let remaining = (self.expected_size - self.received_size) as usize;
        let mut chunk = [0u8; PACKET_DATA_LEN];
        let want = ring.available().min(PACKET_DATA_LEN);
        let n = ring.read_chunk(&mut chunk[..want]);
        if n == 0 {
            return 0;
        }
        // `chunk` and `data` share a capacity, so this cannot fail
        let _ = self.data.extend_from_slice(&chunk[..n]);
        self.packet_id = self.packet_id.wrapping_add(1);
        self.received_size += n as u32;
        if n > remaining {
            warn!(
                "download overrun: expected {} bytes, got {}",
                self.expected_size,
                self.received_size
            );
            self.status = PacketStatus::Failed;
        } else if self.received_size == self.expected_size {
            self.status = PacketStatus::Complete;
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_keeps_explicit_lengths() {
        let msg = Message::new("device/state", b"on\0off")
            .unwrap()
            .with_qos(QoS::AtLeastOnce)
            .with_retain(true);
        assert_eq!(msg.topic(), "device/state");
        assert_eq!(msg.topic_len(), 12);
        assert_eq!(msg.payload_len(), 6);
        assert_eq!(msg.payload(), b"on\0off");
        assert_eq!(msg.qos(), QoS::AtLeastOnce);
        assert!(msg.retain());
    }

    #[test]
    fn oversized_fields_are_rejected() {
        let long_topic = "t".repeat(MAX_TOPIC_LEN + 1);
        assert_eq!(
            Message::new(&long_topic, b"").unwrap_err(),
            MessageError::TopicTooLong
        );
        let big = [0u8; MAX_PAYLOAD_LEN + 1];
        assert_eq!(
            Message::new("a", &big).unwrap_err(),
            MessageError::PayloadTooLong
        );
        assert_eq!(Message::new("", b"x").unwrap_err(), MessageError::EmptyTopic);
    }

    #[test]
    fn packet_reassembles_download() {
        let mut ring: ByteRing<2048> = ByteRing::new();
        let firmware = [0xA5u8; 1500];
        assert_eq!(ring.write_chunk(&firmware), 1500);

        let mut packet = Packet::begin(1500);
        assert_eq!(packet.fill_from(&mut ring), 1024);
        assert_eq!(packet.packet_id, 1);
        assert_eq!(packet.status, PacketStatus::InProgress);

        assert_eq!(packet.fill_from(&mut ring), 476);
        assert_eq!(packet.packet_id, 2);
        assert_eq!(packet.received_size, 1500);
        assert_eq!(packet.status, PacketStatus::Complete);
        assert_eq!(packet.fill_from(&mut ring), 0);
    }

    #[test]
    fn empty_download_is_complete() {
        let mut ring: ByteRing<64> = ByteRing::new();
        ring.write_chunk(&[7u8; 4]);
        let mut packet = Packet::begin(0);
        assert_eq!(packet.status, PacketStatus::Complete);
        assert_eq!(packet.fill_from(&mut ring), 0);
        assert_eq!(packet.packet_id, 0);
        assert_eq!(ring.available(), 4);
    }

    #[test]
    fn packet_overrun_fails() {
        let mut ring: ByteRing<64> = ByteRing::new();
        ring.write_chunk(&[1u8; 20]);
        let mut packet = Packet::begin(10);
        assert_eq!(packet.fill_from(&mut ring), 20);
        assert_eq!(packet.status, PacketStatus::Failed);
    }
}
