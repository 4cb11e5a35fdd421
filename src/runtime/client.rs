//! The cloud client: state machine, queue draining and protocol routing.

use embassy_futures::select::select;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Instant, Timer};
use heapless::String;

use super::link::{Link, MAX_PUB_MSGS};
use super::provisioning::{PROVISION_RESPONSE_LEN, ProvisionError, provision};
use super::registry::{MAX_SUBSCRIBE_TOPICS, TopicRegistry};
use super::traits::{EventHandler, JobHandler, ShadowHandler};
use crate::config::{CloudConfig, THING_NAME_LEN};
use crate::error::{ClientError, ConfigError, JobError, ShadowError};
use crate::event::{Event, EventDispatcher, Notice};
use crate::jobs::{self, Dispatch, JobRegistry, JobStatus, StatusReport};
use crate::message::{MAX_PAYLOAD_LEN, Message, QoS};
use crate::shadow::{
    DeltaSection, ShadowElement, ShadowField, ShadowRegistry, ShadowTableConfig, ShadowValue, UpdateKind,
};
use crate::state::{ConnectionState, Trigger};
use crate::storage::DeviceStorage;
use crate::topics::{self, Route, ShadowOp, Topic};
use crate::transport::{CloudTransport, Session};

/// Number of attempts made to publish one queued message before it is
/// dropped.
pub const MAX_PUBLISH_RETRY: u8 = 3;

/// Longest job status report body.
const REPORT_LEN: usize = 64;

struct InFlight {
    msg: Message,
    attempts: u8,
}

#[derive(Default)]
struct Backoff {
    failures: u32,
    next_attempt: Option<Instant>,
    exhausted: bool,
}

/// Device-cloud synchronization client.
///
/// The client owns the transport, the storage and the registries; the
/// application shares only the [`Link`]. Drive it with [`run`](Self::run) on
/// an Embassy task, or call [`poll`](Self::poll) from an existing loop.
///
/// ```ignore
/// static LINK: Link<CriticalSectionRawMutex> = Link::new();
///
/// let mut client = CloudClient::new(config, &LINK, transport, storage);
/// client.register_shadow(None, &elements, &on_delta)?;
/// client.register_job("reboot", 0, &on_reboot)?;
/// client.init()?;
/// client.start()?;
/// client.run().await;
/// ```
pub struct CloudClient<'a, M: RawMutex, T: CloudTransport, S: DeviceStorage> {
    config: CloudConfig<'a>,
    link: &'a Link<M>,
    transport: T,
    storage: S,
    state: ConnectionState,
    shadows: ShadowRegistry<'a>,
    jobs: JobRegistry<'a>,
    topics: TopicRegistry<MAX_SUBSCRIBE_TOPICS>,
    events: EventDispatcher<'a>,
    thing_name: String<THING_NAME_LEN>,
    in_flight: Option<InFlight>,
    backoff: Backoff,
}

impl<'a, M, T, S> CloudClient<'a, M, T, S>
where
    M: RawMutex,
    T: CloudTransport,
    S: DeviceStorage,
{
    pub fn new(config: CloudConfig<'a>, link: &'a Link<M>, transport: T, storage: S) -> Self {
        Self {
            config,
            link,
            transport,
            storage,
            state: ConnectionState::Idle,
            shadows: ShadowRegistry::new(),
            jobs: JobRegistry::new(),
            topics: TopicRegistry::new(),
            events: EventDispatcher::new(None),
            thing_name: String::new(),
            in_flight: None,
            backoff: Backoff::default(),
        }
    }

    pub fn set_event_handler(&mut self, handler: &'a dyn EventHandler) {
        self.events.set_handler(handler);
    }

    // Registration

    /// Registers a shadow table. Only allowed before [`start`](Self::start).
    pub fn register_shadow(
        &mut self,
        name: Option<&str>,
        elements: &[ShadowElement],
        handler: &'a dyn ShadowHandler,
    ) -> Result<usize, ClientError<T::Error>> {
        self.ensure_registration_open()?;
        Ok(self.shadows.register(name, elements, handler)?)
    }

    /// Registers several shadow tables; see
    /// [`ShadowRegistry::register_tables`].
    pub fn register_shadows(&mut self, tables: &[ShadowTableConfig<'_, 'a>]) -> Result<(), ClientError<T::Error>> {
        self.ensure_registration_open()?;
        Ok(self.shadows.register_tables(tables)?)
    }

    /// Registers a job handler. Only allowed before [`start`](Self::start).
    pub fn register_job(
        &mut self,
        action: &str,
        timeout_minutes: u8,
        handler: &'a dyn JobHandler,
    ) -> Result<(), ClientError<T::Error>> {
        self.ensure_registration_open()?;
        Ok(self.jobs.register(action, timeout_minutes, handler)?)
    }

    fn ensure_registration_open(&self) -> Result<(), ClientError<T::Error>> {
        match self.state {
            ConnectionState::Idle | ConnectionState::Init => Ok(()),
            _ => Err(ClientError::RegistrationClosed),
        }
    }

    // Lifecycle

    /// Validates the configuration and sizes the queues.
    pub fn init(&mut self) -> Result<(), ClientError<T::Error>> {
        self.state.on(Trigger::Init)?;
        self.config.validate()?;
        self.link.configure(
            usize::from(self.config.max_pub_msg_to_store),
            usize::from(self.config.max_sub_msg_to_store),
        )?;
        self.shadows.set_limit(usize::from(self.config.max_shadows));
        self.jobs.set_limit(usize::from(self.config.max_jobs));
        self.topics.set_limit(usize::from(self.config.max_subscribe_topics));
        self.transition(Trigger::Init)?;
        Ok(())
    }

    /// Begins transport bring-up on the next poll.
    ///
    /// Fails if no identity is configured or stored and no claim credentials
    /// exist to obtain one.
    pub fn start(&mut self) -> Result<(), ClientError<T::Error>> {
        let has_identity = self.config.thing.is_some() || self.storage.is_device_registered();
        if !has_identity && self.config.claim.is_none() {
            return Err(ConfigError::MissingCredentials.into());
        }
        self.transition(Trigger::Start)?;
        self.refresh_thing_name();
        self.backoff = Backoff::default();
        Ok(())
    }

    /// Pauses the client. Registrations and queued publishes are kept.
    pub async fn suspend(&mut self) -> Result<(), ClientError<T::Error>> {
        let was_connected = self.state.is_connected();
        self.transition(Trigger::Suspend)?;
        if was_connected {
            self.drop_session().await;
        }
        Ok(())
    }

    /// Leaves suspension; the next poll reconnects.
    pub fn resume(&mut self) -> Result<(), ClientError<T::Error>> {
        self.transition(Trigger::Resume)?;
        self.backoff = Backoff::default();
        Ok(())
    }

    /// Drops the session, if any, and connects again.
    pub async fn restart(&mut self) -> Result<(), ClientError<T::Error>> {
        let was_connected = self.state.is_connected();
        self.transition(Trigger::Restart)?;
        if was_connected {
            self.drop_session().await;
        }
        self.link.clear_inbound();
        self.backoff = Backoff::default();
        Ok(())
    }

    /// Disconnects, empties every queue and returns to idle.
    pub async fn close(&mut self) -> Result<(), ClientError<T::Error>> {
        let was_connected = self.state.is_connected();
        self.transition(Trigger::Close)?;
        if was_connected {
            self.drop_session().await;
        }
        self.link.reset();
        self.in_flight = None;
        self.jobs.reset();
        self.backoff = Backoff::default();
        Ok(())
    }

    // Application operations

    /// Subscribes to an application topic. Subscriptions are restored on
    /// every reconnect.
    pub async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), ClientError<T::Error>> {
        if !self.topics.add(topic, qos) {
            return Err(ClientError::TooManyTopics);
        }
        if self.state.is_connected() {
            self.transport
                .subscribe(topic, qos)
                .await
                .map_err(ClientError::Transport)?;
        }
        Ok(())
    }

    /// Queues an application message; see [`Link::publish`].
    pub fn publish(&self, msg: Message) -> Result<(), ClientError<T::Error>> {
        Ok(self.link.publish(msg)?)
    }

    /// Changes a shadow value from the device side.
    ///
    /// While connected the table's pending elements are queued as one update
    /// document right away; otherwise they are published on the next connect.
    pub fn update_shadow(
        &mut self,
        index: usize,
        key: &str,
        value: ShadowValue,
        kind: UpdateKind,
    ) -> Result<(), ClientError<T::Error>> {
        self.shadows.update(index, key, value, kind)?;
        if self.state.is_connected() {
            self.queue_pending_shadow(index)?;
        }
        Ok(())
    }

    /// Queues one update document carrying `fields`.
    pub fn shadow_document_update(
        &mut self,
        index: usize,
        fields: &[ShadowField<'_>],
        kind: UpdateKind,
    ) -> Result<(), ClientError<T::Error>> {
        let mut doc = [0u8; MAX_PAYLOAD_LEN];
        let len = self.shadows.render_fields(index, fields, kind, &mut doc)?;
        let topic = self.shadow_topic(index, ShadowOp::Update)?;
        let msg = Message::new(&topic, &doc[..len])?.with_qos(QoS::AtLeastOnce);
        Ok(self.link.publish(msg)?)
    }

    /// Reports the status of a running job.
    ///
    /// Unknown job ids are logged and ignored. `Rejected` frees the slot
    /// without telling the cloud.
    pub fn update_job_status(&mut self, job_id: &str, status: JobStatus) -> Result<(), ClientError<T::Error>> {
        if status == JobStatus::Rejected {
            self.jobs.commit_status(job_id, status);
            return Ok(());
        }
        let Some(report) = self.jobs.status_report(job_id, status) else {
            warn!("status update for unknown job {}", job_id);
            return Ok(());
        };
        self.queue_job_report(&report)?;
        self.jobs.commit_status(job_id, status);
        Ok(())
    }

    // Queries

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// The thing name in use, once known.
    pub fn thing_name(&self) -> Option<&str> {
        (!self.thing_name.is_empty()).then_some(self.thing_name.as_str())
    }

    /// `true` once reconnection gave up; cleared by `restart` or `resume`.
    pub fn retries_exhausted(&self) -> bool {
        self.backoff.exhausted
    }

    pub fn pub_msg_available(&self) -> usize {
        self.link.pub_msg_available()
    }

    pub fn sub_msg_available(&self) -> usize {
        self.link.sub_msg_available()
    }

    pub fn sub_msg_read(&self) -> Option<Message> {
        self.link.sub_msg_read()
    }

    pub fn publish_in_progress(&self) -> bool {
        self.link.publish_in_progress()
    }

    pub fn clear_pub_msgs(&self) {
        self.link.clear_pub_msgs()
    }

    pub fn link(&self) -> &'a Link<M> {
        self.link
    }

    pub fn shadows(&self) -> &ShadowRegistry<'a> {
        &self.shadows
    }

    pub fn jobs(&self) -> &JobRegistry<'a> {
        &self.jobs
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Access to the storage collaborator, e.g. for application data.
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    // Driving

    /// Runs the client forever, polling every configured tick or as soon as
    /// the link reports activity.
    pub async fn run(&mut self) -> ! {
        loop {
            self.poll(Instant::now()).await;
            select(Timer::after(self.config.tick), self.link.wait_activity()).await;
        }
    }

    /// Advances the client by one step and returns the resulting state.
    pub async fn poll(&mut self, now: Instant) -> ConnectionState {
        self.drain_notices(now);
        self.jobs.expire(now);

        match self.state {
            ConnectionState::Start => self.bring_up(now).await,
            ConnectionState::Resumed => {
                if self.advance(Trigger::Start) {
                    self.bring_up(now).await;
                }
            }
            ConnectionState::Provisioning => {
                if self.attempt_due(now) {
                    self.run_provisioning(now).await;
                }
            }
            ConnectionState::Disconnected => {
                if self.attempt_due(now) {
                    self.connect(now).await;
                }
            }
            ConnectionState::Connected
            | ConnectionState::Idle
            | ConnectionState::Init
            | ConnectionState::Suspended
            | ConnectionState::ProvisionFailed => {}
        }
        if self.state.is_connected() {
            self.route_inbound(now).await;
            self.drain_outbound().await;
        }
        self.state
    }

    fn drain_notices(&mut self, now: Instant) {
        while let Some(notice) = self.link.take_notice() {
            self.events.notice(notice);
            if notice == Notice::BrokerDisconnected && self.state.is_connected() {
                warn!("broker session lost");
                if self.advance(Trigger::LinkLost) {
                    self.events.cloud_down();
                    self.backoff.next_attempt = Some(now);
                }
            }
        }
    }

    async fn bring_up(&mut self, now: Instant) {
        if session(&self.config, &self.storage).is_some() {
            self.connect(now).await;
        } else if self.advance(Trigger::BeginProvisioning) {
            self.run_provisioning(now).await;
        }
    }

    /// Trades the claim credentials for a device identity.
    ///
    /// Connection and transport failures are retried on the reconnect
    /// schedule. A refusal or an unusable reply from the service, running out
    /// of attempts, or failing to store the identity ends in `ProvisionFailed`.
    async fn run_provisioning(&mut self, now: Instant) {
        let Some(claim) = self.config.claim else {
            error!("no identity and no claim credentials");
            self.advance(Trigger::ProvisionFailed);
            return;
        };
        let claim_session = Session {
            host: self.config.host,
            port: self.config.port,
            client_id: claim.serial_number,
            root_ca: self.config.root_ca,
            certificate: claim.certificate,
            private_key: claim.private_key,
        };
        if let Err(e) = self.transport.connect(&claim_session).await {
            warn!("provisioning: claim connection failed: {:?}", e);
            self.provisioning_retry(now);
            return;
        }

        let mut response = [0u8; PROVISION_RESPONSE_LEN];
        let result = provision(
            &mut self.transport,
            &claim,
            self.config.provision_timeout,
            &mut response,
        )
        .await;
        if let Err(e) = self.transport.disconnect().await {
            debug!("provisioning: disconnect failed: {:?}", e);
        }

        let identity = match result {
            Ok(identity) => identity,
            Err(ProvisionError::Transport(e)) => {
                warn!("provisioning: exchange failed: {:?}", e);
                self.provisioning_retry(now);
                return;
            }
            Err(e) => {
                error!("provisioning failed: {:?}", e);
                self.advance(Trigger::ProvisionFailed);
                return;
            }
        };
        if let Err(e) = self.storage.store_identity(&identity) {
            error!("provisioning: cannot persist identity: {:?}", e);
            self.advance(Trigger::ProvisionFailed);
            return;
        }
        self.refresh_thing_name();
        self.backoff = Backoff::default();
        self.events.emit(Event::ThingProvisioned);
        self.advance(Trigger::Provisioned);
    }

    fn provisioning_retry(&mut self, now: Instant) {
        if !self.schedule_retry(now) {
            error!("provisioning: giving up after {} attempts", self.backoff.failures);
            self.advance(Trigger::ProvisionFailed);
        }
    }

    async fn connect(&mut self, now: Instant) {
        let Some(session) = session(&self.config, &self.storage) else {
            error!("no identity to connect with");
            self.connect_failed(now);
            return;
        };
        if let Err(e) = copy_thing_name(&mut self.thing_name, session.client_id) {
            error!("cannot connect: {:?}", e);
            self.connect_failed(now);
            return;
        }

        info!("connecting to {}:{} as {}", session.host, session.port, session.client_id);
        match self.transport.connect(&session).await {
            Ok(()) => {
                if self.advance(Trigger::LinkUp) {
                    self.backoff = Backoff::default();
                    self.on_link_up().await;
                }
            }
            Err(e) => {
                warn!("connection failed: {:?}", e);
                self.connect_failed(now);
            }
        }
    }

    fn connect_failed(&mut self, now: Instant) {
        if !self.advance(Trigger::ConnectFailed) {
            return;
        }
        if !self.schedule_retry(now) {
            error!("giving up after {} connection attempts", self.backoff.failures);
            self.events.emit(Event::ReconnectExhausted);
        }
    }

    /// Counts a failed attempt and schedules the next one. Returns `false`
    /// once the attempt budget is spent.
    fn schedule_retry(&mut self, now: Instant) -> bool {
        self.backoff.failures += 1;
        if self.config.reconnect.is_exhausted(self.backoff.failures) {
            self.backoff.exhausted = true;
            return false;
        }
        let delay = self.config.reconnect.backoff_delay(self.backoff.failures);
        self.backoff.next_attempt = Some(now + delay);
        true
    }

    fn attempt_due(&self, now: Instant) -> bool {
        !self.backoff.exhausted && self.backoff.next_attempt.is_none_or(|at| now >= at)
    }

    /// Restores subscriptions and pushes the device's view after a connect.
    async fn on_link_up(&mut self) {
        let thing = self.thing_name.clone();

        for table in self.shadows.tables() {
            for op in [ShadowOp::UpdateDelta, ShadowOp::GetAccepted] {
                match topics::shadow(&thing, table.name(), op) {
                    Ok(topic) => subscribe_logged(&mut self.transport, &topic, QoS::AtLeastOnce).await,
                    Err(e) => warn!("shadow topic too long: {:?}", e),
                }
            }
        }
        if !self.jobs.is_empty() {
            for topic in [topics::jobs_notify_next(&thing), topics::jobs_next_get_accepted(&thing)] {
                match topic {
                    Ok(topic) => subscribe_logged(&mut self.transport, &topic, QoS::AtLeastOnce).await,
                    Err(e) => warn!("jobs topic too long: {:?}", e),
                }
            }
        }
        for (topic, qos) in self.topics.iter() {
            subscribe_logged(&mut self.transport, topic, qos).await;
        }

        for index in 0..self.shadows.len() {
            self.publish_pending_shadow(index).await;
            if let Ok(topic) = self.shadow_topic(index, ShadowOp::Get) {
                self.send_system(&topic, b"{}").await;
            }
        }
        if !self.jobs.is_empty() {
            if let Ok(topic) = topics::jobs_next_get(&thing) {
                self.send_system(&topic, b"{}").await;
            }
        }

        self.events.cloud_up();
    }

    async fn publish_pending_shadow(&mut self, index: usize) {
        let mut doc = [0u8; MAX_PAYLOAD_LEN];
        let len = match self.shadows.render_pending(index, &mut doc) {
            Ok(Some(len)) => len,
            Ok(None) => return,
            Err(e) => {
                warn!("shadow {}: cannot render update: {:?}", index, e);
                return;
            }
        };
        let Ok(topic) = self.shadow_topic(index, ShadowOp::Update) else {
            return;
        };
        if self.send_system(&topic, &doc[..len]).await {
            self.shadows.mark_published(index);
        }
    }

    fn queue_pending_shadow(&mut self, index: usize) -> Result<(), ClientError<T::Error>> {
        let mut doc = [0u8; MAX_PAYLOAD_LEN];
        let Some(len) = self.shadows.render_pending(index, &mut doc)? else {
            return Ok(());
        };
        let topic = self.shadow_topic(index, ShadowOp::Update)?;
        let msg = Message::new(&topic, &doc[..len])?.with_qos(QoS::AtLeastOnce);
        self.link.publish(msg)?;
        self.shadows.mark_published(index);
        Ok(())
    }

    fn shadow_topic(&self, index: usize, op: ShadowOp) -> Result<Topic, ClientError<T::Error>> {
        if self.thing_name.is_empty() {
            return Err(ClientError::NotConnected);
        }
        let table = self
            .shadows
            .table(index)
            .ok_or(ShadowError::UnknownShadow(index))?;
        Ok(topics::shadow(&self.thing_name, table.name(), op)?)
    }

    /// Publishes a protocol message directly, bypassing the publish queue.
    async fn send_system(&mut self, topic: &str, payload: &[u8]) -> bool {
        match self.transport.publish(topic, payload, QoS::AtLeastOnce, false).await {
            Ok(()) => true,
            Err(e) => {
                warn!("publish to {} failed: {:?}", topic, e);
                false
            }
        }
    }

    async fn route_inbound(&mut self, now: Instant) {
        while let Some(msg) = self.link.take_inbound() {
            let route = topics::classify(&self.thing_name, msg.topic());
            match route {
                Route::Application => {
                    self.link.deliver(msg);
                }
                Route::System if self.topics.matches(msg.topic()) => {
                    self.link.deliver(msg);
                }
                Route::ShadowDelta(name) => {
                    self.apply_shadow_document(name, msg.payload(), DeltaSection::State);
                }
                Route::ShadowGetAccepted(name) => {
                    self.apply_shadow_document(name, msg.payload(), DeltaSection::StateDelta);
                }
                Route::JobNotify | Route::JobNextAccepted => match msg.payload_str() {
                    Some(payload) => self.handle_job(payload, now),
                    None => warn!("job notification is not UTF-8"),
                },
                Route::System => trace!("ignoring {}", msg.topic()),
            }
        }
    }

    fn apply_shadow_document(&mut self, name: Option<&str>, doc: &[u8], section: DeltaSection) {
        let Some(index) = self.shadows.index_of(name) else {
            debug!("delta for unregistered shadow");
            return;
        };
        // failures are logged by the registry
        let _ = self.shadows.apply_delta_document(index, doc, section);
    }

    fn handle_job(&mut self, payload: &str, now: Instant) {
        let next = match jobs::parse_next(payload) {
            Ok(Some(next)) => next,
            Ok(None) => {
                debug!("no pending jobs");
                return;
            }
            Err(e) => {
                warn!("bad job notification: {:?}", e);
                return;
            }
        };
        match self.jobs.dispatch(next.action, &next.job, now) {
            Ok(Dispatch::Report(report)) => {
                if let Err(e) = self.queue_job_report(&report) {
                    error!("job {}: cannot queue {} report: {:?}", next.job.id, report.status.as_str(), e);
                }
            }
            Ok(Dispatch::Silent) => info!("job {} rejected by handler", next.job.id),
            Ok(Dispatch::Duplicate) => debug!("job {} already running", next.job.id),
            Err(JobError::Busy) => debug!("action {} busy, job {} deferred", next.action, next.job.id),
            Err(e) => warn!("cannot run job {}: {:?}", next.job.id, e),
        }
    }

    /// Queues a status report so it goes out through the retried publish path.
    fn queue_job_report(&self, report: &StatusReport) -> Result<(), ClientError<T::Error>> {
        let topic = topics::job_update(&self.thing_name, &report.job_id)?;
        let mut body = [0u8; REPORT_LEN];
        let len = report.render(&mut body)?;
        let msg = Message::new(&topic, &body[..len])?.with_qos(QoS::AtLeastOnce);
        Ok(self.link.publish(msg)?)
    }

    /// Publishes queued messages in order, one at a time.
    async fn drain_outbound(&mut self) {
        for _ in 0..MAX_PUB_MSGS {
            if self.in_flight.is_none() {
                let Some(msg) = self.link.take_outbound() else {
                    break;
                };
                self.in_flight = Some(InFlight { msg, attempts: 0 });
                self.link.set_in_flight(true);
            }
            let Some(pending) = self.in_flight.as_mut() else {
                break;
            };
            let msg = &pending.msg;
            match self
                .transport
                .publish(msg.topic(), msg.payload(), msg.qos(), msg.retain())
                .await
            {
                Ok(()) => {
                    trace!("published {} bytes to {}", msg.payload_len(), msg.topic());
                    self.in_flight = None;
                    self.link.set_in_flight(false);
                    self.events.emit(Event::PublishSuccess);
                }
                Err(e) => {
                    pending.attempts += 1;
                    if pending.attempts >= MAX_PUBLISH_RETRY {
                        error!(
                            "dropping message on {} after {} attempts: {:?}",
                            pending.msg.topic(),
                            pending.attempts,
                            e
                        );
                        self.in_flight = None;
                        self.link.set_in_flight(false);
                    } else {
                        warn!("publish failed (attempt {}): {:?}", pending.attempts, e);
                    }
                    break;
                }
            }
        }
    }

    // Helpers

    fn transition(&mut self, trigger: Trigger) -> Result<(), ClientError<T::Error>> {
        let next = self.state.on(trigger)?;
        if next != self.state {
            info!("state {} -> {}", self.state.as_str(), next.as_str());
        }
        self.state = next;
        Ok(())
    }

    /// Internal transition; an invalid move is logged and reported as `false`.
    fn advance(&mut self, trigger: Trigger) -> bool {
        match self.transition(trigger) {
            Ok(()) => true,
            Err(_) => {
                error!("invalid transition {:?} from {}", trigger, self.state.as_str());
                false
            }
        }
    }

    async fn drop_session(&mut self) {
        if let Err(e) = self.transport.disconnect().await {
            debug!("disconnect failed: {:?}", e);
        }
        self.events.cloud_down();
    }

    fn refresh_thing_name(&mut self) {
        if let Some(session) = session(&self.config, &self.storage) {
            if let Err(e) = copy_thing_name(&mut self.thing_name, session.client_id) {
                error!("thing name unusable: {:?}", e);
            }
        }
    }
}

/// Replaces `dst` with `name`. An oversized name leaves `dst` empty.
fn copy_thing_name(dst: &mut String<THING_NAME_LEN>, name: &str) -> Result<(), ConfigError> {
    dst.clear();
    dst.push_str(name).map_err(|_| ConfigError::ThingNameTooLong)
}

/// Picks the identity to connect with: configured credentials first, then the
/// stored ones.
fn session<'s, S: DeviceStorage>(config: &'s CloudConfig<'_>, storage: &'s S) -> Option<Session<'s>> {
    let (client_id, certificate, private_key) = match (&config.thing, storage.identity()) {
        (Some(thing), _) => (thing.thing_name, thing.certificate, thing.private_key),
        (None, Some(id)) => (
            id.thing_name.as_str(),
            id.certificate.as_str(),
            id.private_key.as_str(),
        ),
        (None, None) => return None,
    };
    Some(Session {
        host: config.host,
        port: config.port,
        client_id,
        root_ca: config.root_ca,
        certificate,
        private_key,
    })
}

async fn subscribe_logged<T: CloudTransport>(transport: &mut T, topic: &str, qos: QoS) {
    if let Err(e) = transport.subscribe(topic, qos).await {
        warn!("subscribe to {} failed: {:?}", topic, e);
    }
}
