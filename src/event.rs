//! # Event Dispatcher
//!
//! Turns connectivity notices from the collaborators and state changes of the
//! client into application [`Event`]s. Link notices are edge-filtered: a
//! repeated "Wi-Fi up" while already up produces nothing, so every real
//! transition yields exactly one callback.

use crate::runtime::EventHandler;

/// Events delivered to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    WifiConnected,
    WifiDisconnected,
    BleConnected,
    BleAuthenticated,
    BleDisconnected,
    /// A BLE notification was delivered to the peer.
    BleSendSuccess,
    CloudConnected,
    CloudDisconnected,
    /// One queued message reached the broker.
    PublishSuccess,
    /// Fleet provisioning stored a new identity.
    ThingProvisioned,
    /// Reconnection gave up after the configured number of attempts.
    ReconnectExhausted,
}

/// Connectivity notices posted by the network collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Notice {
    WifiUp,
    WifiDown,
    BleConnected,
    BleAuthenticated,
    BleDisconnected,
    BleSent,
    /// The broker session dropped.
    BrokerDisconnected,
}

/// Delivers events to one optional handler.
pub struct EventDispatcher<'a> {
    handler: Option<&'a dyn EventHandler>,
    wifi_up: Option<bool>,
    ble_up: Option<bool>,
    cloud_up: bool,
}

impl<'a> EventDispatcher<'a> {
    pub fn new(handler: Option<&'a dyn EventHandler>) -> Self {
        Self {
            handler,
            wifi_up: None,
            ble_up: None,
            cloud_up: false,
        }
    }

    pub fn set_handler(&mut self, handler: &'a dyn EventHandler) {
        self.handler = Some(handler);
    }

    /// Emits an event unconditionally.
    pub fn emit(&self, event: Event) {
        debug!("event {:?}", event);
        if let Some(handler) = self.handler {
            handler.on_event(event);
        }
    }

    /// Applies a collaborator notice, emitting an event if it changes the
    /// link picture.
    ///
    /// `BrokerDisconnected` is left to the client, which owns the cloud link
    /// state; it is reported through [`cloud_down`](Self::cloud_down).
    pub fn notice(&mut self, notice: Notice) {
        match notice {
            Notice::WifiUp => self.link_edge(Link::Wifi, true),
            Notice::WifiDown => self.link_edge(Link::Wifi, false),
            Notice::BleConnected => self.link_edge(Link::Ble, true),
            Notice::BleDisconnected => self.link_edge(Link::Ble, false),
            Notice::BleAuthenticated => self.emit(Event::BleAuthenticated),
            Notice::BleSent => self.emit(Event::BleSendSuccess),
            Notice::BrokerDisconnected => {}
        }
    }

    /// The broker session came up.
    pub fn cloud_up(&mut self) {
        if !self.cloud_up {
            self.cloud_up = true;
            self.emit(Event::CloudConnected);
        }
    }

    /// The broker session went down or was closed.
    pub fn cloud_down(&mut self) {
        if self.cloud_up {
            self.cloud_up = false;
            self.emit(Event::CloudDisconnected);
        }
    }

    pub fn is_cloud_up(&self) -> bool {
        self.cloud_up
    }

    fn link_edge(&mut self, link: Link, up: bool) {
        let (state, up_event, down_event) = match link {
            Link::Wifi => (&mut self.wifi_up, Event::WifiConnected, Event::WifiDisconnected),
            Link::Ble => (&mut self.ble_up, Event::BleConnected, Event::BleDisconnected),
        };
        if *state == Some(up) {
            return;
        }
        *state = Some(up);
        self.emit(if up { up_event } else { down_event });
    }
}

#[derive(Clone, Copy)]
enum Link {
    Wifi,
    Ble,
}
