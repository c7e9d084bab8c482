// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Soft/hard reset and NV parameter reconciliation.
//!
//! The hard-reset write order is a firmware compatibility requirement:
//! reset before options, options before PAN identifiers.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, warn};

use crate::error::{ControllerError, ControllerResult, STATUS_NOT_FOUND};
use crate::nv::{NvConfig, NvItem, NvParams, STARTOPT_CLEAR_STATE};
use crate::subsystem::Subsystem;

use super::dispatcher::RequestDispatcher;

/// `SYS:resetReq` type byte used for every reset.
const RESET_TYPE: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    Soft,
    Hard,
}

impl FromStr for ResetMode {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "soft" => Ok(Self::Soft),
            "hard" => Ok(Self::Hard),
            _ => Err(ControllerError::invalid(format!("unknown reset mode '{}'", s))),
        }
    }
}

impl TryFrom<u8> for ResetMode {
    type Error = ControllerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Soft),
            0 => Ok(Self::Hard),
            _ => Err(ControllerError::invalid(format!("unknown reset mode {}", value))),
        }
    }
}

/// One request of the hard-reset sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetStep {
    ResetRequest,
    WriteConfig(&'static str, NvItem),
    OsalWrite(&'static str, NvItem),
}

impl ResetStep {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ResetRequest => "resetReq",
            Self::WriteConfig(name, _) | Self::OsalWrite(name, _) => name,
        }
    }

    fn request(&self) -> (Subsystem, &'static str, Value) {
        match self {
            Self::ResetRequest => (Subsystem::Sys, "resetReq", json!({ "type": RESET_TYPE })),
            Self::WriteConfig(_, item) => (Subsystem::Sapi, "writeConfiguration", item.write_args()),
            Self::OsalWrite(_, item) => (Subsystem::Sys, "osalNvWrite", item.osal_write_args()),
        }
    }
}

/// The hard-reset plan with the delay applied after each step.
pub fn hard_reset_plan(nv: &NvConfig, step_delay: Duration) -> Vec<(ResetStep, Duration)> {
    use ResetStep::*;

    vec![
        (ResetRequest, Duration::ZERO),
        (WriteConfig("startupOption", nv.startup_option.clone()), step_delay),
        (ResetRequest, step_delay),
        (WriteConfig("panId", nv.pan_id.clone()), step_delay),
        (WriteConfig("extPanId", nv.ext_pan_id.clone()), step_delay),
        (WriteConfig("channelList", nv.channel_list.clone()), step_delay),
        (WriteConfig("logicalType", nv.logical_type.clone()), step_delay),
        (WriteConfig("precfgkey", nv.precfgkey.clone()), step_delay),
        (WriteConfig("precfgkeysEnable", nv.precfgkeys_enable.clone()), step_delay),
        (OsalWrite("securityMode", nv.security_mode.clone()), step_delay),
        (WriteConfig("zdoDirectCb", nv.zdo_direct_cb.clone()), step_delay),
    ]
}

#[derive(Debug, Default)]
struct NvState {
    config: NvConfig,
    // Set when the firmware NV no longer matches `config`.
    dirty: bool,
}

/// Forces the clear-state startup option for one hard reset and puts the
/// previous value back when dropped.
struct StartupOverride<'a> {
    nv: &'a Mutex<NvState>,
    was_dirty: bool,
    prior: Option<Vec<u8>>,
}

impl<'a> StartupOverride<'a> {
    fn engage(nv: &'a Mutex<NvState>) -> Self {
        let mut state = lock(nv);
        let was_dirty = state.dirty;
        let mut prior = None;
        if was_dirty && state.config.startup_option.value != [STARTOPT_CLEAR_STATE] {
            prior = Some(state.config.startup_option.value.clone());
            state.config.startup_option.value = vec![STARTOPT_CLEAR_STATE];
            debug!("Forcing clear-state startup option for this reset");
        }
        Self { nv, was_dirty, prior }
    }

    /// The reset went through: the NV now matches, so drop the dirty mark.
    fn commit(self) {
        if self.was_dirty {
            lock(self.nv).dirty = false;
        }
    }
}

impl Drop for StartupOverride<'_> {
    fn drop(&mut self) {
        if let Some(prior) = self.prior.take() {
            lock(self.nv).config.startup_option.value = prior;
        }
    }
}

/// Clears the resetting flag on every exit path.
struct ResettingFlag<'a>(&'a AtomicBool);

impl<'a> ResettingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ResettingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ResetSequencer {
    dispatcher: Arc<RequestDispatcher>,
    nv: Mutex<NvState>,
    resetting: AtomicBool,
    // Count of reset indications seen from the firmware.
    reset_count: watch::Sender<u64>,
    step_delay: Duration,
    reset_timeout: Duration,
}

impl ResetSequencer {
    pub fn new(
        dispatcher: Arc<RequestDispatcher>,
        step_delay: Duration,
        reset_timeout: Duration,
    ) -> Self {
        let (reset_count, _) = watch::channel(0);
        Self {
            dispatcher,
            nv: Mutex::new(NvState::default()),
            resetting: AtomicBool::new(false),
            reset_count,
            step_delay,
            reset_timeout,
        }
    }

    pub fn is_resetting(&self) -> bool {
        self.resetting.load(Ordering::SeqCst)
    }

    pub fn is_config_dirty(&self) -> bool {
        lock(&self.nv).dirty
    }

    pub fn nv_config(&self) -> NvConfig {
        lock(&self.nv).config.clone()
    }

    pub fn apply_nv_params(&self, params: &NvParams) -> ControllerResult<()> {
        lock(&self.nv).config.apply(params)
    }

    /// Record a firmware reset indication.
    pub fn reset_indicated(&self) {
        self.reset_count.send_modify(|count| *count += 1);
    }

    pub async fn reset(&self, mode: ResetMode) -> ControllerResult<()> {
        let _flag = ResettingFlag::raise(&self.resetting);
        match mode {
            ResetMode::Soft => {
                info!("Starting a software reset...");
                let target = *self.reset_count.borrow() + 1;
                self.run_step(&ResetStep::ResetRequest).await?;
                self.await_reset_indications(target).await
            }
            ResetMode::Hard => {
                info!("Starting a hardware reset...");
                self.hard_reset().await
            }
        }
    }

    async fn hard_reset(&self) -> ControllerResult<()> {
        let startup = StartupOverride::engage(&self.nv);
        let plan = hard_reset_plan(&lock(&self.nv).config, self.step_delay);

        // One indication per reset request, counted from the start of the
        // sequence so a late confirmation of the first reset is not taken
        // for the second.
        let resets = plan
            .iter()
            .filter(|(step, _)| *step == ResetStep::ResetRequest)
            .count() as u64;
        let target = *self.reset_count.borrow() + resets;
        for (step, delay) in &plan {
            debug!("Hard reset step {}", step.name());
            self.run_step(step)
                .await
                .map_err(|e| ControllerError::SequenceAborted {
                    step: step.name(),
                    source: Box::new(e),
                })?;
            if !delay.is_zero() {
                time::sleep(*delay).await;
            }
        }

        self.await_reset_indications(target).await?;
        startup.commit();
        Ok(())
    }

    async fn run_step(&self, step: &ResetStep) -> ControllerResult<Value> {
        let (subsystem, command, args) = step.request();
        self.dispatcher.dispatch(subsystem, command, args).await
    }

    /// Wait until the indication count reaches `target`.
    async fn await_reset_indications(&self, target: u64) -> ControllerResult<()> {
        let mut rx = self.reset_count.subscribe();
        let reached = async move {
            let seen = rx.wait_for(|count| *count >= target).await;
            seen.is_ok()
        };
        match time::timeout(self.reset_timeout, reached).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ControllerError::ResetTimeout),
            Err(_) => {
                warn!("No reset indication within {:?}", self.reset_timeout);
                Err(ControllerError::ResetTimeout)
            }
        }
    }

    /// Read back the verified NV items; on any mismatch hard-reset with
    /// the local values.
    pub async fn check_nv_params(&self) -> ControllerResult<()> {
        match self.verify_nv().await {
            Ok(None) => Ok(()),
            Ok(Some(name)) => {
                info!("Non-Volatile memory is changed ({} differs)", name);
                self.rewrite_nv().await
            }
            Err(e) if e.status() == Some(STATUS_NOT_FOUND) => {
                info!("Non-Volatile memory is changed ({})", e);
                self.rewrite_nv().await
            }
            Err(e) => Err(e),
        }
    }

    async fn rewrite_nv(&self) -> ControllerResult<()> {
        lock(&self.nv).dirty = true;
        self.reset(ResetMode::Hard).await
    }

    /// First mismatching item, or `None` when firmware matches.
    async fn verify_nv(&self) -> ControllerResult<Option<&'static str>> {
        let items: Vec<(&'static str, NvItem)> = lock(&self.nv)
            .config
            .verified_items()
            .into_iter()
            .map(|(name, item)| (name, item.clone()))
            .collect();

        for (name, item) in items {
            let rsp = self
                .dispatcher
                .dispatch(Subsystem::Sapi, "readConfiguration", item.read_args())
                .await?;
            time::sleep(self.step_delay).await;
            if !item.matches_readback(&rsp) {
                return Ok(Some(name));
            }
        }
        Ok(None)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
