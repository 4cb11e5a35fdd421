//! The shared link between the network task, the polling task and the
//! application.
//!
//! Three parties touch the queues:
//!
//! - the transport's task delivers incoming messages and connectivity
//!   notices ([`Link::on_message`], [`Link::notify`]);
//! - the application queues publishes and reads its subscriptions
//!   ([`Link::publish`], [`Link::sub_msg_read`]);
//! - the polling task in [`CloudClient`](super::CloudClient) moves data
//!   between them.
//!
//! Every access is one short critical section around a single copy, so a
//! `Link` can live in a `static` and be shared by reference.
//!
//! ```ignore
//! static LINK: Link<CriticalSectionRawMutex> = Link::new();
//!
//! // in the transport task
//! LINK.on_message(topic, payload);
//!
//! // in the application task
//! LINK.publish(Message::new("home/kitchen/temp", b"21.5")?)?;
//! ```

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;

use crate::error::QueueError;
use crate::event::Notice;
use crate::message::Message;
use crate::ring_buffer::SharedRing;

/// Compiled maximum depth of the publish queue.
pub const MAX_PUB_MSGS: usize = 10;

/// Compiled maximum depth of the inbound and subscribe queues.
pub const MAX_SUB_MSGS: usize = 10;

/// Depth of the connectivity notice queue.
pub const MAX_NOTICES: usize = 8;

pub struct Link<M: RawMutex> {
    inbound: SharedRing<M, Message, MAX_SUB_MSGS>,
    outbound: SharedRing<M, Message, MAX_PUB_MSGS>,
    received: SharedRing<M, Message, MAX_SUB_MSGS>,
    notices: SharedRing<M, Notice, MAX_NOTICES>,
    dropped: Mutex<M, Cell<u32>>,
    in_flight: Mutex<M, Cell<bool>>,
    activity: Signal<M, ()>,
}

impl<M: RawMutex> Link<M> {
    pub const fn new() -> Self {
        Self {
            inbound: SharedRing::new(),
            outbound: SharedRing::new(),
            received: SharedRing::new(),
            notices: SharedRing::new(),
            dropped: Mutex::new(Cell::new(0)),
            in_flight: Mutex::new(Cell::new(false)),
            activity: Signal::new(),
        }
    }

    /// Sizes the queues. Every queue is emptied first.
    pub fn configure(&self, publish_depth: usize, subscribe_depth: usize) -> Result<(), QueueError> {
        self.inbound.clear();
        self.outbound.clear();
        self.received.clear();
        self.outbound.set_capacity(publish_depth)?;
        self.inbound.set_capacity(subscribe_depth)?;
        self.received.set_capacity(subscribe_depth)
    }

    // Network side

    /// Delivers a message that arrived from the broker.
    ///
    /// Returns `false` if the inbound queue is full or the message does not
    /// fit; the message is dropped and counted.
    pub fn on_message(&self, topic: &str, payload: &[u8]) -> bool {
        let accepted = match Message::new(topic, payload).map(|msg| self.inbound.write(msg)) {
            Ok(Ok(())) => {
                trace!("inbound message on {}", topic);
                true
            }
            Ok(Err(_)) => {
                warn!("inbound queue full, dropping message on {}", topic);
                false
            }
            Err(e) => {
                warn!("dropping message on {}: {:?}", topic, e);
                false
            }
        };
        if !accepted {
            self.count_drop();
        }
        self.activity.signal(());
        accepted
    }

    /// Reports that the broker session dropped.
    pub fn on_disconnect(&self) {
        self.notify(Notice::BrokerDisconnected);
    }

    /// Posts a connectivity notice.
    pub fn notify(&self, notice: Notice) {
        if self.notices.write(notice).is_err() {
            warn!("notice queue full, dropping {:?}", notice);
        }
        self.activity.signal(());
    }

    // Application side

    /// Queues a message for publishing.
    ///
    /// Messages wait in the queue while the client is disconnected.
    pub fn publish(&self, msg: Message) -> Result<(), QueueError> {
        if self.outbound.write(msg).is_err() {
            warn!("publish queue full");
            return Err(QueueError::Full);
        }
        self.activity.signal(());
        Ok(())
    }

    /// Number of messages waiting to be published.
    pub fn pub_msg_available(&self) -> usize {
        self.outbound.available()
    }

    /// Drops every message waiting to be published.
    pub fn clear_pub_msgs(&self) {
        self.outbound.clear();
    }

    /// `true` while a message is being handed to the transport or retried.
    pub fn publish_in_progress(&self) -> bool {
        self.in_flight.lock(Cell::get)
    }

    /// Takes the oldest message received on an application subscription.
    pub fn sub_msg_read(&self) -> Option<Message> {
        self.received.read()
    }

    pub fn sub_msg_available(&self) -> usize {
        self.received.available()
    }

    /// Number of incoming messages dropped because a queue was full.
    pub fn dropped_messages(&self) -> u32 {
        self.dropped.lock(Cell::get)
    }

    /// Waits until the network or the application posts something.
    pub async fn wait_activity(&self) {
        self.activity.wait().await
    }

    // Polling task side

    pub(crate) fn take_inbound(&self) -> Option<Message> {
        self.inbound.read()
    }

    pub(crate) fn take_notice(&self) -> Option<Notice> {
        self.notices.read()
    }

    pub(crate) fn take_outbound(&self) -> Option<Message> {
        self.outbound.read()
    }

    /// Hands a message to the application's subscribe queue.
    pub(crate) fn deliver(&self, msg: Message) -> bool {
        if self.received.write(msg).is_err() {
            warn!("subscribe queue full, dropping message");
            self.count_drop();
            return false;
        }
        true
    }

    pub(crate) fn set_in_flight(&self, in_flight: bool) {
        self.in_flight.lock(|c| c.set(in_flight));
    }

    pub(crate) fn clear_inbound(&self) {
        self.inbound.clear();
        self.notices.clear();
    }

    /// Empties every queue.
    pub(crate) fn reset(&self) {
        self.clear_inbound();
        self.outbound.clear();
        self.received.clear();
        self.set_in_flight(false);
    }

    fn count_drop(&self) {
        self.dropped.lock(|c| c.set(c.get().wrapping_add(1)));
    }
}

impl<M: RawMutex> Default for Link<M> {
    fn default() -> Self {
        Self::new()
    }
}
