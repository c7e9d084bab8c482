// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use zcoord_core::transport::TransportFuture;
use zcoord_core::{
    BindTarget, BindingKind, Controller, ControllerConfig, ControllerError, ControllerListener,
    DeviceDirectory, DeviceInfo, DeviceStatus, EndpointRef, Ident, IeeeAddr, Indication,
    JoinPhase, Subsystem, Transport, TransportError, TransportEvent, ZdoCodec,
};
use zcoord_core::device::DirectoryFuture;

/// One request as seen by the mock.
#[derive(Debug, Clone)]
pub struct Call {
    pub key: String,
    pub args: Value,
    pub at: Instant,
}

/// A scripted reply, consumed once.
#[derive(Debug, Clone)]
pub enum Reply {
    Value(Value),
    Error(TransportError),
    Hang,
}

/// Transport and ZDO codec double.
///
/// Keeps an NV store so `SAPI:writeConfiguration` / `readConfiguration`
/// behave like firmware, answers `SYS:resetReq` with a reset indication,
/// and lets tests override any `SUBSYS:cmd` with scripted replies.
pub struct MockTransport {
    calls: Mutex<Vec<Call>>,
    scripted: Mutex<HashMap<String, VecDeque<Reply>>>,
    nv: Mutex<HashMap<u64, Vec<u64>>>,
    events: mpsc::Sender<TransportEvent>,
    reset_indications: AtomicBool,
    reset_indication_delay: Mutex<Duration>,
    reset_indication_budget: Mutex<Option<usize>>,
}

impl MockTransport {
    pub fn new(events: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            scripted: Mutex::new(HashMap::new()),
            nv: Mutex::new(HashMap::new()),
            events,
            reset_indications: AtomicBool::new(true),
            reset_indication_delay: Mutex::new(Duration::ZERO),
            reset_indication_budget: Mutex::new(None),
        }
    }

    pub fn script(&self, key: &str, reply: Reply) {
        self.scripted
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn set_reset_indications(&self, enabled: bool) {
        self.reset_indications.store(enabled, Ordering::SeqCst);
    }

    /// Send each reset indication `delay` after its `SYS:resetReq` answer.
    pub fn set_reset_indication_delay(&self, delay: Duration) {
        *self.reset_indication_delay.lock().unwrap() = delay;
    }

    /// Answer only the next `count` reset requests with an indication.
    pub fn limit_reset_indications(&self, count: usize) {
        *self.reset_indication_budget.lock().unwrap() = Some(count);
    }

    pub fn store_nv(&self, id: u16, value: &[u8]) {
        self.nv
            .lock()
            .unwrap()
            .insert(u64::from(id), value.iter().map(|b| u64::from(*b)).collect());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.key).collect()
    }

    pub fn count(&self, key: &str) -> usize {
        self.calls().iter().filter(|c| c.key == key).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.try_send(event);
    }

    async fn handle(&self, key: String, args: Value) -> Result<Value, TransportError> {
        self.calls.lock().unwrap().push(Call {
            key: key.clone(),
            args: args.clone(),
            at: Instant::now(),
        });

        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(Reply::Value(value)) => return Ok(value),
            Some(Reply::Error(e)) => return Err(e),
            Some(Reply::Hang) => return std::future::pending().await,
            None => {}
        }

        Ok(self.firmware_reply(&key, &args))
    }

    fn firmware_reply(&self, key: &str, args: &Value) -> Value {
        match key {
            "SAPI:writeConfiguration" => {
                let id = args["configid"].as_u64().unwrap_or_default();
                let value = args["value"]
                    .as_array()
                    .map(|v| v.iter().filter_map(Value::as_u64).collect())
                    .unwrap_or_default();
                self.nv.lock().unwrap().insert(id, value);
                json!({ "status": 0 })
            }
            "SAPI:readConfiguration" => {
                let id = args["configid"].as_u64().unwrap_or_default();
                match self.nv.lock().unwrap().get(&id) {
                    Some(value) => json!({
                        "status": 0,
                        "configid": id,
                        "len": value.len(),
                        "value": value,
                    }),
                    None => json!({ "status": 2 }),
                }
            }
            "SYS:resetReq" => {
                if self.reset_indications.load(Ordering::SeqCst) && self.take_reset_budget() {
                    let event = TransportEvent::Unsolicited(Indication::ResetInd { reason: 0 });
                    let delay = *self.reset_indication_delay.lock().unwrap();
                    if delay.is_zero() {
                        self.emit(event);
                    } else {
                        let events = self.events.clone();
                        tokio::spawn(async move {
                            time::sleep(delay).await;
                            let _ = events.send(event).await;
                        });
                    }
                }
                json!({})
            }
            _ => json!({ "status": 0 }),
        }
    }
}

impl MockTransport {
    fn take_reset_budget(&self) -> bool {
        match &mut *self.reset_indication_budget.lock().unwrap() {
            Some(0) => false,
            Some(left) => {
                *left -= 1;
                true
            }
            None => true,
        }
    }
}

impl Transport for MockTransport {
    fn open<'a>(&'a self) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.emit(TransportEvent::Ready);
            Ok(())
        })
    }

    fn close<'a>(&'a self) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.emit(TransportEvent::Closed);
            Ok(())
        })
    }

    fn request<'a>(
        &'a self,
        subsystem: Subsystem,
        command: &'a Ident,
        args: &'a Value,
    ) -> TransportFuture<'a, Value> {
        Box::pin(self.handle(format!("{}:{}", subsystem, command), args.clone()))
    }
}

impl ZdoCodec for MockTransport {
    fn request<'a>(&'a self, command: &'a Ident, args: &'a Value) -> TransportFuture<'a, Value> {
        Box::pin(self.handle(format!("ZDO:{}", command), args.clone()))
    }
}

/// How the mock directory answers a description query.
#[derive(Debug, Clone, Copy)]
pub enum Query {
    Ok,
    Fail,
    Hang,
}

#[derive(Default)]
pub struct MockDirectory {
    online: Mutex<HashSet<IeeeAddr>>,
    script: Mutex<HashMap<IeeeAddr, VecDeque<Query>>>,
    query_delay: Mutex<Duration>,
    reject: AtomicBool,
    queries: Mutex<Vec<IeeeAddr>>,
    incoming: Mutex<Vec<IeeeAddr>>,
    panic_on: Mutex<HashSet<IeeeAddr>>,
    bindings: Mutex<Vec<Binding>>,
    fail_bindings: AtomicBool,
}

/// One binding request as seen by the mock directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub kind: BindingKind,
    pub source: EndpointRef,
    pub cluster_id: u16,
    pub target: BindTarget,
}

impl MockDirectory {
    pub fn set_online(&self, ieee_addr: IeeeAddr) {
        self.online.lock().unwrap().insert(ieee_addr);
    }

    pub fn script(&self, ieee_addr: IeeeAddr, replies: &[Query]) {
        self.script
            .lock()
            .unwrap()
            .entry(ieee_addr)
            .or_default()
            .extend(replies.iter().copied());
    }

    pub fn set_query_delay(&self, delay: Duration) {
        *self.query_delay.lock().unwrap() = delay;
    }

    pub fn reject_incoming(&self) {
        self.reject.store(true, Ordering::SeqCst);
    }

    /// Panic inside `query_device` for `ieee_addr`.
    pub fn panic_on(&self, ieee_addr: IeeeAddr) {
        self.panic_on.lock().unwrap().insert(ieee_addr);
    }

    pub fn fail_bindings(&self) {
        self.fail_bindings.store(true, Ordering::SeqCst);
    }

    pub fn bindings(&self) -> Vec<Binding> {
        self.bindings.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<IeeeAddr> {
        self.queries.lock().unwrap().clone()
    }

    pub fn incoming(&self) -> Vec<IeeeAddr> {
        self.incoming.lock().unwrap().clone()
    }
}

impl DeviceDirectory for MockDirectory {
    fn device_status(&self, ieee_addr: IeeeAddr) -> Option<DeviceStatus> {
        self.online
            .lock()
            .unwrap()
            .contains(&ieee_addr)
            .then_some(DeviceStatus::Online)
    }

    fn query_device<'a>(
        &'a self,
        nwk_addr: u16,
        ieee_addr: IeeeAddr,
    ) -> DirectoryFuture<'a, DeviceInfo> {
        Box::pin(async move {
            self.queries.lock().unwrap().push(ieee_addr);
            let panics = self.panic_on.lock().unwrap().contains(&ieee_addr);
            if panics {
                panic!("directory failure for {}", ieee_addr);
            }
            let step = self
                .script
                .lock()
                .unwrap()
                .get_mut(&ieee_addr)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Query::Ok);
            let delay = *self.query_delay.lock().unwrap();

            match step {
                Query::Ok => {
                    if !delay.is_zero() {
                        time::sleep(delay).await;
                    }
                    Ok(DeviceInfo {
                        nwk_addr,
                        ieee_addr,
                        endpoints: vec![1],
                        description: Value::Null,
                    })
                }
                Query::Fail => Err(ControllerError::Query("no simple descriptor".into())),
                Query::Hang => std::future::pending().await,
            }
        })
    }

    fn device_incoming<'a>(&'a self, info: DeviceInfo) -> DirectoryFuture<'a, ()> {
        Box::pin(async move {
            self.incoming.lock().unwrap().push(info.ieee_addr);
            if self.reject.load(Ordering::SeqCst) {
                Err(ControllerError::Query("rejected".into()))
            } else {
                Ok(())
            }
        })
    }

    fn set_binding_entry<'a>(
        &'a self,
        kind: BindingKind,
        source: EndpointRef,
        cluster_id: u16,
        target: BindTarget,
    ) -> DirectoryFuture<'a, ()> {
        Box::pin(async move {
            self.bindings.lock().unwrap().push(Binding {
                kind,
                source,
                cluster_id,
                target,
            });
            if self.fail_bindings.load(Ordering::SeqCst) {
                Err(ControllerError::Query("bind rejected".into()))
            } else {
                Ok(())
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Ready,
    Closed,
    PermitJoin(u8),
    Joining(IeeeAddr, JoinPhase),
    Error(String),
    Indication,
}

#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<Event>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn permit_join_values(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::PermitJoin(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub fn joining(&self) -> Vec<(IeeeAddr, JoinPhase)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Joining(addr, phase) => Some((addr, phase)),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl ControllerListener for RecordingListener {
    fn on_network_ready(&self) {
        self.push(Event::Ready);
    }

    fn on_network_closed(&self) {
        self.push(Event::Closed);
    }

    fn on_permit_join_change(&self, seconds_left: u8) {
        self.push(Event::PermitJoin(seconds_left));
    }

    fn on_device_joining(&self, ieee_addr: IeeeAddr, phase: JoinPhase) {
        self.push(Event::Joining(ieee_addr, phase));
    }

    fn on_error(&self, message: &str) {
        self.push(Event::Error(message.to_string()));
    }

    fn on_indication(&self, _indication: &Indication) {
        self.push(Event::Indication);
    }
}

pub struct Harness {
    pub controller: Arc<Controller>,
    pub transport: Arc<MockTransport>,
    pub directory: Arc<MockDirectory>,
    pub listener: Arc<RecordingListener>,
    pub event_loop: JoinHandle<()>,
}

pub fn harness() -> Harness {
    harness_with(&ControllerConfig::default())
}

pub fn harness_with(config: &ControllerConfig) -> Harness {
    let (tx, rx) = mpsc::channel(64);
    let transport = Arc::new(MockTransport::new(tx));
    let directory = Arc::new(MockDirectory::default());
    let controller = Controller::new(
        config,
        transport.clone(),
        transport.clone(),
        directory.clone(),
    )
    .expect("controller");
    let listener = Arc::new(RecordingListener::default());
    controller.register_listener(listener.clone());
    let event_loop = controller.spawn_event_loop(rx);

    Harness {
        controller,
        transport,
        directory,
        listener,
        event_loop,
    }
}

pub fn addr(n: u64) -> IeeeAddr {
    IeeeAddr(0x00124b0000000000 | n)
}

pub fn announce(n: u64) -> zcoord_core::DeviceAnnounce {
    zcoord_core::DeviceAnnounce {
        nwk_addr: n as u16,
        ieee_addr: addr(n),
        capabilities: 0x8e,
    }
}

/// Let spawned tasks run until they block; moves the paused clock by 1 ms.
pub async fn settle() {
    time::sleep(Duration::from_millis(1)).await;
}
