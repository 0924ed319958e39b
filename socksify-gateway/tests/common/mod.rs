//! Scripted routing engine shared by the integration tests

#![allow(dead_code)]

use ipnet::IpNet;
use socksify_gateway::engine::EngineResult;
use socksify_gateway::proxy::ProxyHandle;
use socksify_gateway::routing::ProcessName;
use socksify_gateway::{
    EngineError, EngineFactory, EventSink, Gateway, GatewaySettings, LogLevel, ProxyConfig,
    RoutingEngine,
};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// One call observed by the mock engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start,
    Stop,
    Bypass(usize),
    AddProxy(ProxyHandle),
    RemoveProxy(ProxyHandle),
    Associate(String, ProxyHandle),
    Exclude(String),
    Include(String, IpNet),
    RemoveDestination(String, IpNet),
}

impl Call {
    fn name(&self) -> &'static str {
        match self {
            Call::Start => "start",
            Call::Stop => "stop",
            Call::Bypass(_) => "bypass",
            Call::AddProxy(_) => "add_proxy",
            Call::RemoveProxy(_) => "remove_proxy",
            Call::Associate(..) => "associate",
            Call::Exclude(_) => "exclude",
            Call::Include(..) => "include",
            Call::RemoveDestination(..) => "remove_destination",
        }
    }
}

/// Shared state between a test and every engine its factory creates
#[derive(Default)]
pub struct Script {
    calls: Mutex<Vec<Call>>,
    fail: Mutex<Option<&'static str>>,
    start_delay: Mutex<Duration>,
    stop_delay: Mutex<Duration>,
    sink: Mutex<Option<EventSink>>,
}

impl Script {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every call of the given kind fail until cleared
    pub fn fail_on(&self, call: &'static str) {
        *self.fail.lock().unwrap() = Some(call);
    }

    pub fn clear_failure(&self) {
        *self.fail.lock().unwrap() = None;
    }

    pub fn delay_start(&self, delay: Duration) {
        *self.start_delay.lock().unwrap() = delay;
    }

    pub fn delay_stop(&self, delay: Duration) {
        *self.stop_delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    /// Event sink handed to the most recently created engine
    pub fn sink(&self) -> EventSink {
        self.sink
            .lock()
            .unwrap()
            .clone()
            .expect("no engine created yet")
    }

    fn record(&self, call: Call) -> EngineResult<()> {
        let failing = *self.fail.lock().unwrap() == Some(call.name());
        self.calls.lock().unwrap().push(call.clone());
        if failing {
            return Err(EngineError::Rejected(format!("scripted failure: {call:?}")));
        }
        Ok(())
    }
}

pub struct MockEngine {
    script: Arc<Script>,
}

impl RoutingEngine for MockEngine {
    fn start(&mut self) -> EngineResult<()> {
        let delay = *self.script.start_delay.lock().unwrap();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        self.script.record(Call::Start)
    }

    fn stop(&mut self) {
        let delay = *self.script.stop_delay.lock().unwrap();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        let _ = self.script.record(Call::Stop);
    }

    fn set_bypass_ranges(&mut self, ranges: &[IpNet]) -> EngineResult<()> {
        self.script.record(Call::Bypass(ranges.len()))
    }

    fn add_proxy(&mut self, handle: ProxyHandle, _config: &ProxyConfig) -> EngineResult<()> {
        self.script.record(Call::AddProxy(handle))
    }

    fn remove_proxy(&mut self, handle: ProxyHandle) -> EngineResult<()> {
        self.script.record(Call::RemoveProxy(handle))
    }

    fn associate_process(&mut self, process: &ProcessName, proxy: ProxyHandle) -> EngineResult<()> {
        self.script
            .record(Call::Associate(process.as_str().to_string(), proxy))
    }

    fn exclude_process(&mut self, process: &ProcessName) -> EngineResult<()> {
        self.script.record(Call::Exclude(process.as_str().to_string()))
    }

    fn include_destination(&mut self, process: &ProcessName, cidr: IpNet) -> EngineResult<()> {
        self.script
            .record(Call::Include(process.as_str().to_string(), cidr))
    }

    fn remove_destination(&mut self, process: &ProcessName, cidr: IpNet) -> EngineResult<()> {
        self.script
            .record(Call::RemoveDestination(process.as_str().to_string(), cidr))
    }
}

pub struct MockFactory(pub Arc<Script>);

impl EngineFactory for MockFactory {
    fn create(&self, events: EventSink) -> EngineResult<Box<dyn RoutingEngine>> {
        if *self.0.fail.lock().unwrap() == Some("create") {
            return Err(EngineError::Init("scripted failure: create".to_string()));
        }
        *self.0.sink.lock().unwrap() = Some(events);
        Ok(Box::new(MockEngine {
            script: self.0.clone(),
        }))
    }
}

pub fn settings() -> GatewaySettings {
    GatewaySettings {
        log_limit: 500,
        log_event_interval_ms: 20,
        engine_start_timeout_ms: 2_000,
        engine_stop_timeout_ms: 2_000,
    }
}

pub fn gateway_with(settings: GatewaySettings) -> (Gateway, Arc<Script>) {
    let script = Script::new();
    let gateway = Gateway::new(
        LogLevel::All,
        settings,
        Arc::new(MockFactory(script.clone())),
    );
    (gateway, script)
}

pub fn gateway() -> (Gateway, Arc<Script>) {
    gateway_with(settings())
}

pub fn net(raw: &str) -> IpNet {
    raw.parse().unwrap()
}

/// Poll `cond` until it holds or `deadline` passes
pub fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}
