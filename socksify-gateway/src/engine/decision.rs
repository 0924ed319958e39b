//! In-process engine that mirrors pushed configuration and answers routing
//! decisions. Capture backends can wrap it or replace it entirely.

use super::{EngineFactory, EngineResult, EventSink, RoutingEngine};
use crate::error::EngineError;
use crate::filter::{Route, RoutePolicy};
use crate::logging::LogLevel;
use crate::proxy::{Protocol, ProxyConfig, ProxyHandle};
use crate::routing::{ProcessBinding, ProcessName, ProcessPolicy};
use ipnet::IpNet;
use std::collections::HashMap;
use std::net::IpAddr;

pub struct DecisionEngine {
    events: EventSink,
    running: bool,
    policy: RoutePolicy,
    proxies: HashMap<ProxyHandle, ProxyConfig>,
    processes: HashMap<ProcessName, ProcessPolicy>,
}

impl DecisionEngine {
    pub fn new(events: EventSink) -> Self {
        Self {
            events,
            running: false,
            policy: RoutePolicy::new(),
            proxies: HashMap::new(),
            processes: HashMap::new(),
        }
    }

    fn process_mut(&mut self, process: &ProcessName) -> EngineResult<&mut ProcessPolicy> {
        self.processes
            .get_mut(process)
            .ok_or_else(|| EngineError::Rejected(format!("no policy for {process}")))
    }

    fn bind(&mut self, process: &ProcessName, binding: ProcessBinding) {
        self.processes
            .entry(process.clone())
            .and_modify(|policy| policy.binding = binding)
            .or_insert_with(|| ProcessPolicy::new(binding));
    }
}

impl RoutingEngine for DecisionEngine {
    fn start(&mut self) -> EngineResult<()> {
        self.running = true;
        self.events.message(LogLevel::Debug, "Decision engine started");
        Ok(())
    }

    fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.proxies.clear();
        self.processes.clear();
        self.policy = RoutePolicy::new();
        self.events.message(LogLevel::Debug, "Decision engine stopped");
    }

    fn set_bypass_ranges(&mut self, ranges: &[IpNet]) -> EngineResult<()> {
        self.policy.set_bypass(ranges);
        self.events.message(
            LogLevel::Info,
            format!("Bypassing {} local ranges", ranges.len()),
        );
        Ok(())
    }

    fn add_proxy(&mut self, handle: ProxyHandle, config: &ProxyConfig) -> EngineResult<()> {
        if config.autostart {
            self.events.message(
                LogLevel::Info,
                format!("Proxy {handle} at {} active", config.endpoint),
            );
        }
        self.proxies.insert(handle, config.clone());
        Ok(())
    }

    fn remove_proxy(&mut self, handle: ProxyHandle) -> EngineResult<()> {
        if self.processes.values().any(|p| p.proxy() == Some(handle)) {
            return Err(EngineError::Rejected(format!("proxy {handle} still in use")));
        }
        self.proxies.remove(&handle);
        Ok(())
    }

    fn associate_process(&mut self, process: &ProcessName, proxy: ProxyHandle) -> EngineResult<()> {
        if !self.proxies.contains_key(&proxy) {
            return Err(EngineError::Rejected(format!("unknown proxy {proxy}")));
        }
        self.bind(process, ProcessBinding::Proxy(proxy));
        Ok(())
    }

    fn exclude_process(&mut self, process: &ProcessName) -> EngineResult<()> {
        self.bind(process, ProcessBinding::Excluded);
        Ok(())
    }

    fn include_destination(&mut self, process: &ProcessName, cidr: IpNet) -> EngineResult<()> {
        self.process_mut(process)?.include_cidrs.insert(cidr);
        Ok(())
    }

    fn remove_destination(&mut self, process: &ProcessName, cidr: IpNet) -> EngineResult<()> {
        self.process_mut(process)?.include_cidrs.remove(&cidr);
        Ok(())
    }

    fn route(
        &self,
        process: &ProcessName,
        destination: IpAddr,
        protocol: Protocol,
    ) -> Option<Route> {
        if !self.running {
            return None;
        }

        let policy = self.processes.get(process);
        let protocols = policy
            .and_then(ProcessPolicy::proxy)
            .and_then(|handle| self.proxies.get(&handle))
            .map(|config| config.protocols);

        Some(self.policy.evaluate(policy, protocols, destination, protocol))
    }
}

/// Factory used by the process-wide gateway unless another is installed
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionEngineFactory;

impl EngineFactory for DecisionEngineFactory {
    fn create(&self, events: EventSink) -> EngineResult<Box<dyn RoutingEngine>> {
        Ok(Box::new(DecisionEngine::new(events)))
    }
}
