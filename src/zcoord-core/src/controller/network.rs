// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Network metadata and the permit-join countdown.

use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info};

use crate::error::{ControllerError, ControllerResult};
use crate::subsystem::Subsystem;

use super::dispatcher::RequestDispatcher;
use super::events::ControllerEventEmitter;

/// ZDO device state code for a started coordinator.
pub const DEV_STATE_ZB_COORD: u8 = 0x09;

/// Permit-join durations that do not count down.
const PERMIT_DISABLE: u8 = 0x00;
const PERMIT_ALWAYS: u8 = 0xff;

/// Device state: raw firmware code, or a label once translated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NetState {
    Code(u8),
    Label(String),
}

/// Network metadata of the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub state: Option<NetState>,
    pub channel: Option<u8>,
    pub pan_id: Option<u16>,
    pub ext_pan_id: Option<String>,
    pub ieee_addr: Option<String>,
    pub nwk_addr: Option<u16>,
    pub join_time_left: u8,
}

/// Who opens the permit-join window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinScope {
    Coordinator,
    All,
}

impl JoinScope {
    /// Address mode and destination of the permit-join request.
    pub fn addressing(self) -> (u8, u16) {
        match self {
            Self::Coordinator => (0x02, 0x0000),
            // all routers and the coordinator
            Self::All => (0x0f, 0xfffc),
        }
    }
}

impl FromStr for JoinScope {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coord" | "0" => Ok(Self::Coordinator),
            "all" | "1" => Ok(Self::All),
            _ => Err(ControllerError::invalid(format!("not a valid join type '{}'", s))),
        }
    }
}

impl TryFrom<u8> for JoinScope {
    type Error = ControllerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Coordinator),
            1 => Ok(Self::All),
            _ => Err(ControllerError::invalid(format!("not a valid join type {}", value))),
        }
    }
}

#[derive(Debug, Default)]
struct PermitWindow {
    seconds_left: u8,
    // Bumped on every permit_join so a superseded ticker stops touching state.
    epoch: u64,
}

pub struct NetworkStateManager {
    info: Mutex<NetworkInfo>,
    window: Arc<Mutex<PermitWindow>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    tick: Duration,
}

impl NetworkStateManager {
    pub fn new(tick: Duration) -> Self {
        Self {
            info: Mutex::new(NetworkInfo::default()),
            window: Arc::new(Mutex::new(PermitWindow::default())),
            ticker: Mutex::new(None),
            tick,
        }
    }

    /// Snapshot with the coordinator state labelled and the live countdown.
    pub fn net_info(&self) -> NetworkInfo {
        let mut net = lock(&self.info).clone();
        if net.state == Some(NetState::Code(DEV_STATE_ZB_COORD)) {
            net.state = Some(NetState::Label("Coordinator".to_string()));
        }
        net.join_time_left = self.join_time_left();
        net
    }

    /// Apply the fields of `partial` that exist on [`NetworkInfo`].
    ///
    /// Unknown keys are ignored. A known key with a value of the wrong type
    /// is rejected and nothing is applied.
    pub fn set_net_info(&self, partial: &Value) -> ControllerResult<()> {
        let Some(fields) = partial.as_object() else {
            return Err(ControllerError::invalid("netInfo should be an object"));
        };

        let mut info = lock(&self.info);
        let mut merged = serde_json::to_value(&*info)
            .map_err(|e| ControllerError::invalid(e.to_string()))?;
        if let Some(current) = merged.as_object_mut() {
            for (key, value) in fields {
                if let Some(slot) = current.get_mut(key) {
                    *slot = value.clone();
                }
            }
        }
        *info = serde_json::from_value(merged)
            .map_err(|e| ControllerError::invalid(format!("netInfo: {}", e)))?;
        Ok(())
    }

    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut NetworkInfo),
    {
        f(&mut lock(&self.info));
    }

    pub fn join_time_left(&self) -> u8 {
        lock(&self.window).seconds_left
    }

    pub fn is_ticking(&self) -> bool {
        lock(&self.ticker)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Open (or close, with 0) the permit-join window.
    pub async fn permit_join(
        &self,
        dispatcher: &RequestDispatcher,
        emitter: &Arc<ControllerEventEmitter>,
        seconds: u8,
        scope: JoinScope,
    ) -> ControllerResult<Value> {
        let (addrmode, dstaddr) = scope.addressing();
        let rsp = dispatcher
            .dispatch(
                Subsystem::Zdo,
                "mgmtPermitJoinReq",
                json!({
                    "addrmode": addrmode,
                    "dstaddr": dstaddr,
                    "duration": seconds,
                    "tcsignificance": 0,
                }),
            )
            .await?;

        {
            // Abort and replace under one guard so no live ticker is orphaned.
            let mut ticker = lock(&self.ticker);
            if let Some(old) = ticker.take() {
                old.abort();
            }
            let epoch = {
                let mut window = lock(&self.window);
                window.seconds_left = seconds;
                window.epoch += 1;
                window.epoch
            };
            if seconds != PERMIT_DISABLE && seconds != PERMIT_ALWAYS {
                *ticker = Some(tokio::spawn(run_countdown(
                    Arc::clone(&self.window),
                    Arc::clone(emitter),
                    epoch,
                    self.tick,
                )));
            }
        }

        info!("Permit join {}s ({:?})", seconds, scope);
        emitter.notify_permit_join_change(seconds);
        Ok(rsp)
    }

    fn cancel_ticker(&self) {
        if let Some(handle) = lock(&self.ticker).take() {
            handle.abort();
        }
    }
}

impl Drop for NetworkStateManager {
    fn drop(&mut self) {
        self.cancel_ticker();
    }
}

async fn run_countdown(
    window: Arc<Mutex<PermitWindow>>,
    emitter: Arc<ControllerEventEmitter>,
    epoch: u64,
    tick: Duration,
) {
    let mut interval = time::interval_at(Instant::now() + tick, tick);
    loop {
        interval.tick().await;
        let left = {
            let mut window = lock(&window);
            if window.epoch != epoch {
                return;
            }
            window.seconds_left = window.seconds_left.saturating_sub(1);
            window.seconds_left
        };
        emitter.notify_permit_join_change(left);
        if left == 0 {
            debug!("Permit join window closed");
            return;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
