//! Gateway controller: lifecycle, proxy/process configuration and log access
//!
//! One `Gateway` owns the proxy registry, the process routing table and, while
//! running, one routing engine session. All configuration goes through its
//! methods, which are serialized by a single lock. Calls made before `start`
//! are recorded and replayed into the engine when a session begins; calls made
//! while running are pushed to the live engine before they return.

use crate::config::{GatewaySettings, SettingsLoader};
use crate::engine::{DecisionEngineFactory, EngineFactory, EngineResult, EventSink, RoutingEngine};
use crate::error::{EngineError, GatewayError, Result};
use crate::filter::{lan_bypass_ranges, Route};
use crate::log::{LogAggregator, LogBuffer, LogEntry, LogFeed, LogSubscriber, SubscriberSlot};
use crate::logging::LogLevel;
use crate::proxy::{Protocol, ProxyConfig, ProxyHandle, ProxyRegistry, SupportedProtocols};
use crate::routing::{parse_cidr, ProcessBinding, ProcessName, ProcessPolicy, RoutingTable};
use crate::status::{GatewayStatus, StatusCell};
use crossbeam_channel::{RecvTimeoutError, SendError};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

static INSTANCE: OnceLock<Gateway> = OnceLock::new();
static ENGINE_FACTORY: OnceLock<Arc<dyn EngineFactory>> = OnceLock::new();

pub struct Gateway {
    level: LogLevel,
    settings: GatewaySettings,
    factory: Arc<dyn EngineFactory>,
    state: Mutex<State>,
    status: Arc<StatusCell>,
    buffer: Arc<LogBuffer>,
    subscriber: Arc<SubscriberSlot>,
    log_interval_ms: Arc<AtomicU64>,
    events: EventSink,
}

#[derive(Default)]
struct State {
    bypass_lan: bool,
    registry: ProxyRegistry,
    table: RoutingTable,
    session: Option<Session>,
    sessions_started: u64,
}

/// Resources that exist only between `start` and `stop`
struct Session {
    id: u64,
    engine: Box<dyn RoutingEngine>,
    /// Proxies the live engine already knows about
    live_proxies: HashSet<ProxyHandle>,
    aggregator: LogAggregator,
}

impl Gateway {
    /// The process-wide gateway, constructed on first call.
    ///
    /// Only the first caller's `level` is used. Settings come from the
    /// `SOCKSIFY_*` environment variables; the engine comes from
    /// [`Gateway::install_engine_factory`] or defaults to the in-process
    /// decision engine.
    pub fn get_instance(level: LogLevel) -> &'static Gateway {
        INSTANCE.get_or_init(|| {
            let factory = ENGINE_FACTORY
                .get_or_init(|| Arc::new(DecisionEngineFactory))
                .clone();
            Gateway::new(level, SettingsLoader::from_env(), factory)
        })
    }

    /// The process-wide gateway if it has been constructed
    pub fn instance() -> Option<&'static Gateway> {
        INSTANCE.get()
    }

    /// Choose the engine used by the process-wide gateway. Only effective
    /// before the first `get_instance`; returns false otherwise.
    pub fn install_engine_factory(factory: Arc<dyn EngineFactory>) -> bool {
        ENGINE_FACTORY.set(factory).is_ok()
    }

    /// A standalone gateway, independent of the process-wide one
    pub fn new(
        level: LogLevel,
        settings: GatewaySettings,
        factory: Arc<dyn EngineFactory>,
    ) -> Self {
        let buffer = Arc::new(LogBuffer::new(settings.log_limit));
        let status = Arc::new(StatusCell::new());
        let events = EventSink::new(buffer.clone(), status.clone(), level);

        Self {
            level,
            log_interval_ms: Arc::new(AtomicU64::new(settings.log_event_interval_ms)),
            settings,
            factory,
            state: Mutex::new(State::default()),
            status,
            buffer,
            subscriber: Arc::new(SubscriberSlot::default()),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The session, if its engine is healthy enough to take configuration
    fn live<'a>(&self, session: &'a mut Option<Session>) -> Option<&'a mut Session> {
        if self.status.load().is_running() {
            session.as_mut()
        } else {
            None
        }
    }

    fn report(&self, level: LogLevel, text: impl Into<String>) {
        self.events.message(level, text);
    }

    // ---- lifecycle ------------------------------------------------------

    /// Start a routing session. True if running afterwards.
    pub fn start(&self) -> bool {
        match self.try_start() {
            Ok(()) => true,
            Err(e) => {
                self.report(LogLevel::Error, format!("Failed to start gateway: {e}"));
                false
            }
        }
    }

    fn try_start(&self) -> Result<()> {
        let mut state = self.state();

        match self.status.load() {
            GatewayStatus::Connected | GatewayStatus::Disconnected => return Ok(()),
            GatewayStatus::Error => return Err(GatewayError::Faulted),
            GatewayStatus::Stopped => {}
        }

        let mut engine = self.launch_engine()?;
        let (live_proxies, aggregator) = match self.bring_up(&state, engine.as_mut()) {
            Ok(parts) => parts,
            Err(e) => {
                self.shutdown_engine(engine);
                return Err(e);
            }
        };

        state.sessions_started += 1;
        let id = state.sessions_started;
        state.session = Some(Session {
            id,
            engine,
            live_proxies,
            aggregator,
        });
        self.status.store(GatewayStatus::Connected);

        info!(
            session = id,
            proxies = state.registry.len(),
            processes = state.table.len(),
            bypass_lan = state.bypass_lan,
            "Gateway started"
        );
        self.events.connected(id);
        Ok(())
    }

    /// Create and start an engine on a helper thread, bounded by the start
    /// timeout. An engine that comes up after the deadline is stopped by
    /// the helper.
    fn launch_engine(&self) -> Result<Box<dyn RoutingEngine>> {
        let (tx, rx) = crossbeam_channel::bounded::<EngineResult<Box<dyn RoutingEngine>>>(0);
        let factory = Arc::clone(&self.factory);
        let events = self.events.clone();

        thread::Builder::new()
            .name("socksify-engine-start".to_string())
            .spawn(move || {
                let launched = factory.create(events).and_then(|mut engine| {
                    engine.start()?;
                    Ok(engine)
                });

                if let Err(SendError(Ok(mut engine))) = tx.send(launched) {
                    warn!("Routing engine started after the deadline, stopping it");
                    engine.stop();
                }
            })?;

        let timeout = self.settings.engine_start_timeout();
        match rx.recv_timeout(timeout) {
            Ok(launched) => Ok(launched?),
            Err(RecvTimeoutError::Timeout) => Err(GatewayError::StartTimeout {
                timeout_ms: self.settings.engine_start_timeout_ms,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(EngineError::Init(
                "engine start thread exited without a result".to_string(),
            )
            .into()),
        }
    }

    /// Replay recorded configuration into a fresh engine and start the log
    /// aggregator
    fn bring_up(
        &self,
        state: &State,
        engine: &mut dyn RoutingEngine,
    ) -> Result<(HashSet<ProxyHandle>, LogAggregator)> {
        if state.bypass_lan {
            engine.set_bypass_ranges(&lan_bypass_ranges())?;
        }

        let mut live_proxies = HashSet::new();
        for (handle, config) in state.registry.iter() {
            engine.add_proxy(handle, config)?;
            live_proxies.insert(handle);
        }

        for (name, policy) in state.table.iter() {
            match policy.binding {
                ProcessBinding::Proxy(handle) => engine.associate_process(name, handle)?,
                ProcessBinding::Excluded => engine.exclude_process(name)?,
            }
            for cidr in &policy.include_cidrs {
                engine.include_destination(name, *cidr)?;
            }
        }

        let aggregator = LogAggregator::spawn(LogFeed {
            buffer: Arc::clone(&self.buffer),
            subscriber: Arc::clone(&self.subscriber),
            interval_ms: Arc::clone(&self.log_interval_ms),
        })?;

        Ok((live_proxies, aggregator))
    }

    /// End the session, if any. Always leaves the gateway `Stopped`.
    pub fn stop(&self) -> bool {
        let mut aggregator = {
            let mut state = self.state();
            let Some(session) = state.session.take() else {
                self.status.store(GatewayStatus::Stopped);
                return true;
            };

            let Session {
                id,
                engine,
                aggregator,
                ..
            } = session;

            self.shutdown_engine(engine);
            self.status.store(GatewayStatus::Stopped);
            info!(session = id, "Gateway stopped");
            self.events.disconnected(id);
            aggregator
        };

        // Joined outside the lock: a subscriber may read gateway state
        // during the final flush.
        aggregator.shutdown();
        true
    }

    /// Stop and drop the engine on a helper thread, bounded by the stop
    /// timeout
    fn shutdown_engine(&self, mut engine: Box<dyn RoutingEngine>) {
        let (tx, rx) = crossbeam_channel::bounded::<()>(0);

        let spawned = thread::Builder::new()
            .name("socksify-engine-stop".to_string())
            .spawn(move || {
                engine.stop();
                drop(engine);
                let _ = tx.send(());
            });

        if let Err(e) = spawned {
            warn!("Could not spawn engine teardown thread: {e}");
            return;
        }

        if rx.recv_timeout(self.settings.engine_stop_timeout()).is_err() {
            self.report(
                LogLevel::Warning,
                format!(
                    "Routing engine did not stop within {} ms; abandoning it",
                    self.settings.engine_stop_timeout_ms
                ),
            );
        }
    }

    pub fn status(&self) -> GatewayStatus {
        self.status.load()
    }

    pub fn log_level(&self) -> LogLevel {
        self.level
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    // ---- configuration --------------------------------------------------

    /// Exempt LAN and multicast destinations from proxying. Takes effect at
    /// the next `start`; a running session keeps its bypass configuration.
    pub fn set_bypass_lan(&self) {
        let mut state = self.state();
        state.bypass_lan = true;

        if state.session.is_some() {
            self.report(
                LogLevel::Warning,
                "LAN bypass requested while running; it applies after the next start",
            );
        } else {
            debug!("LAN bypass enabled");
        }
    }

    pub fn is_bypass_lan(&self) -> bool {
        self.state().bypass_lan
    }

    /// Register an upstream SOCKS5 proxy. Returns `ProxyHandle::NULL` if the
    /// endpoint or credentials are malformed or the live engine refuses it.
    pub fn add_socks5_proxy(
        &self,
        endpoint: &str,
        login: Option<&str>,
        password: Option<&str>,
        protocols: SupportedProtocols,
        autostart: bool,
    ) -> ProxyHandle {
        match self.try_add_proxy(endpoint, login, password, protocols, autostart) {
            Ok(handle) => handle,
            Err(e) => {
                self.report(LogLevel::Warning, format!("Rejected proxy {endpoint}: {e}"));
                ProxyHandle::NULL
            }
        }
    }

    fn try_add_proxy(
        &self,
        endpoint: &str,
        login: Option<&str>,
        password: Option<&str>,
        protocols: SupportedProtocols,
        autostart: bool,
    ) -> Result<ProxyHandle> {
        let config = ProxyConfig::new(endpoint, login, password, protocols, autostart)?;

        let mut guard = self.state();
        let state = &mut *guard;

        let handle = state.registry.register(config);
        if handle.is_null() {
            return Err(GatewayError::HandlesExhausted);
        }

        if autostart {
            if let Some(session) = self.live(&mut state.session) {
                if let Err(e) = Self::push_proxy(session, &state.registry, handle) {
                    state.registry.remove(handle);
                    return Err(e);
                }
            }
        }

        debug!(%handle, endpoint, ?protocols, autostart, "Proxy registered");
        Ok(handle)
    }

    /// Make sure the live engine knows `handle`
    fn push_proxy(
        session: &mut Session,
        registry: &ProxyRegistry,
        handle: ProxyHandle,
    ) -> Result<()> {
        if session.live_proxies.contains(&handle) {
            return Ok(());
        }

        let config = registry
            .lookup(handle)
            .ok_or(GatewayError::UnknownProxy { handle })?;
        session.engine.add_proxy(handle, config)?;
        session.live_proxies.insert(handle);
        Ok(())
    }

    /// Unregister a proxy no process is bound to
    pub fn remove_socks5_proxy(&self, handle: ProxyHandle) -> bool {
        self.outcome(format!("remove proxy {handle}"), self.try_remove_proxy(handle))
    }

    fn try_remove_proxy(&self, handle: ProxyHandle) -> Result<()> {
        let mut guard = self.state();
        let state = &mut *guard;

        if !state.registry.contains(handle) {
            return Err(GatewayError::UnknownProxy { handle });
        }
        if let Some(process) = state.table.bound_to(handle) {
            return Err(GatewayError::ProxyInUse {
                handle,
                process: process.to_string(),
            });
        }

        if let Some(session) = self.live(&mut state.session) {
            if session.live_proxies.contains(&handle) {
                session.engine.remove_proxy(handle)?;
                session.live_proxies.remove(&handle);
            }
        }

        state.registry.remove(handle);
        Ok(())
    }

    /// Route `process_name` through `proxy`, replacing any earlier binding
    /// or exclusion
    pub fn associate_process_name_to_proxy(&self, process_name: &str, proxy: ProxyHandle) -> bool {
        self.outcome(
            format!("associate {process_name} with proxy {proxy}"),
            self.try_associate(process_name, proxy),
        )
    }

    fn try_associate(&self, process_name: &str, proxy: ProxyHandle) -> Result<()> {
        let name = ProcessName::parse(process_name)?;

        let mut guard = self.state();
        let state = &mut *guard;

        if !state.registry.contains(proxy) {
            return Err(GatewayError::UnknownProxy { handle: proxy });
        }

        if let Some(session) = self.live(&mut state.session) {
            Self::push_proxy(session, &state.registry, proxy)?;
            session.engine.associate_process(&name, proxy)?;
        }

        state.table.bind(&name, proxy);
        Ok(())
    }

    /// Never proxy `process_name`, superseding any proxy binding
    pub fn exclude_process_name(&self, process_name: &str) -> bool {
        self.outcome(format!("exclude {process_name}"), self.try_exclude(process_name))
    }

    fn try_exclude(&self, process_name: &str) -> Result<()> {
        let name = ProcessName::parse(process_name)?;

        let mut guard = self.state();
        let state = &mut *guard;

        if let Some(session) = self.live(&mut state.session) {
            session.engine.exclude_process(&name)?;
        }

        state.table.exclude(&name);
        Ok(())
    }

    /// Add `cidr` to the destinations `process_name` proxies. The process
    /// must already be associated or excluded; nothing is created here.
    pub fn include_process_destination_cidr(&self, process_name: &str, cidr: &str) -> bool {
        self.outcome(
            format!("include {cidr} for {process_name}"),
            self.try_include_cidr(process_name, cidr),
        )
    }

    fn try_include_cidr(&self, process_name: &str, cidr: &str) -> Result<()> {
        let cidr = parse_cidr(cidr)?;
        let name = ProcessName::parse(process_name)?;

        let mut guard = self.state();
        let state = &mut *guard;

        if state.table.has_cidr(&name, &cidr)? {
            return Ok(());
        }

        if let Some(session) = self.live(&mut state.session) {
            session.engine.include_destination(&name, cidr)?;
        }

        state.table.include_cidr(&name, cidr)?;
        Ok(())
    }

    /// Drop `cidr` from the destinations of `process_name`; absent is fine
    pub fn remove_process_destination_cidr(&self, process_name: &str, cidr: &str) -> bool {
        self.outcome(
            format!("remove {cidr} for {process_name}"),
            self.try_remove_cidr(process_name, cidr),
        )
    }

    fn try_remove_cidr(&self, process_name: &str, cidr: &str) -> Result<()> {
        let cidr = parse_cidr(cidr)?;
        let name = ProcessName::parse(process_name)?;

        let mut guard = self.state();
        let state = &mut *guard;

        if !state.table.has_cidr(&name, &cidr)? {
            return Ok(());
        }

        if let Some(session) = self.live(&mut state.session) {
            session.engine.remove_destination(&name, cidr)?;
        }

        state.table.remove_cidr(&name, &cidr)?;
        Ok(())
    }

    /// Collapse an operation result into the boolean surface, logging the
    /// reason for a failure
    fn outcome(&self, what: String, result: Result<()>) -> bool {
        match result {
            Ok(()) => {
                debug!("{what}: ok");
                true
            }
            Err(e) => {
                self.report(LogLevel::Warning, format!("Cannot {what}: {e}"));
                false
            }
        }
    }

    // ---- introspection --------------------------------------------------

    pub fn proxy_count(&self) -> usize {
        self.state().registry.len()
    }

    pub fn proxy_config(&self, handle: ProxyHandle) -> Option<ProxyConfig> {
        self.state().registry.lookup(handle).cloned()
    }

    pub fn process_policy(&self, process_name: &str) -> Option<ProcessPolicy> {
        let name = ProcessName::parse(process_name).ok()?;
        self.state().table.get(&name).cloned()
    }

    /// Route the running engine would choose for a new flow. `None` when no
    /// session is running or the engine cannot answer.
    pub fn route(
        &self,
        process_name: &str,
        destination: IpAddr,
        protocol: Protocol,
    ) -> Option<Route> {
        let name = ProcessName::parse(process_name).ok()?;
        let mut state = self.state();
        let session = self.live(&mut state.session)?;
        session.engine.route(&name, destination, protocol)
    }

    // ---- log access -----------------------------------------------------

    pub fn set_log_limit(&self, limit: u32) {
        self.buffer.set_limit(limit);
    }

    pub fn get_log_limit(&self) -> u32 {
        self.buffer.limit()
    }

    /// Take everything buffered, oldest first, leaving the buffer empty
    pub fn read_log(&self) -> Vec<LogEntry> {
        self.buffer.drain()
    }

    /// Entries lost to ring overflow so far
    pub fn dropped_log_entries(&self) -> u64 {
        self.buffer.dropped()
    }

    /// Polling interval of the log aggregator; applies from its next wake
    pub fn set_log_event_interval(&self, interval: Duration) {
        let millis = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX).max(1);
        self.log_interval_ms.store(millis, Ordering::Relaxed);
    }

    pub fn log_event_interval(&self) -> Duration {
        Duration::from_millis(self.log_interval_ms.load(Ordering::Relaxed))
    }

    /// Receive log batches on the aggregator thread instead of polling
    /// `read_log`. Replaces any previous subscriber.
    pub fn set_log_subscriber<S>(&self, subscriber: S)
    where
        S: LogSubscriber + 'static,
    {
        self.subscriber.set(Arc::new(subscriber));
    }

    pub fn clear_log_subscriber(&self) {
        self.subscriber.clear();
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.stop();
    }
}
