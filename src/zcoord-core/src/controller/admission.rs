// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Join admission.
//!
//! Device announces are serialized into a pipeline that handles exactly one
//! device at a time. Announces arriving while a device is in flight wait in
//! a FIFO backlog that holds at most one entry per IEEE address.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time;
use tracing::{debug, error, info, warn};

use crate::device::{DeviceAnnounce, DeviceDirectory, DeviceInfo, DeviceStatus, IeeeAddr};
use crate::error::ControllerResult;

use super::events::{ControllerEventEmitter, JoinPhase};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AdmissionState {
    #[default]
    Idle,
    Processing(IeeeAddr),
}

impl fmt::Display for AdmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Processing(addr) => write!(f, "Processing({})", addr),
        }
    }
}

/// What `submit` did with an announce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// The machine was idle; the caller must run the pipeline for it.
    Start(DeviceAnnounce),
    Queued,
    Duplicate,
}

/// How a single device's admission ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    AlreadyOnline,
    Admitted,
    Rejected,
    QueryFailed,
    TimedOut,
}

/// The Idle/Processing machine and its backlog. Transitions only happen
/// through `submit` and `advance`.
#[derive(Debug, Default)]
pub struct AdmissionQueue {
    state: AdmissionState,
    backlog: VecDeque<DeviceAnnounce>,
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AdmissionState {
        self.state
    }

    pub fn backlog(&self) -> Vec<IeeeAddr> {
        self.backlog.iter().map(|a| a.ieee_addr).collect()
    }

    pub fn submit(&mut self, announce: DeviceAnnounce) -> Submission {
        match self.state {
            AdmissionState::Idle => {
                self.state = AdmissionState::Processing(announce.ieee_addr);
                Submission::Start(announce)
            }
            AdmissionState::Processing(_) => {
                if self
                    .backlog
                    .iter()
                    .any(|pending| pending.ieee_addr == announce.ieee_addr)
                {
                    Submission::Duplicate
                } else {
                    self.backlog.push_back(announce);
                    Submission::Queued
                }
            }
        }
    }

    /// Release the in-flight device; dequeue the next one or go idle.
    pub fn advance(&mut self) -> Option<DeviceAnnounce> {
        match self.backlog.pop_front() {
            Some(next) => {
                self.state = AdmissionState::Processing(next.ieee_addr);
                Some(next)
            }
            None => {
                self.state = AdmissionState::Idle;
                None
            }
        }
    }
}

pub struct JoinAdmissionController {
    queue: Mutex<AdmissionQueue>,
    directory: Arc<dyn DeviceDirectory>,
    emitter: Arc<ControllerEventEmitter>,
    join_timeout: Duration,
}

impl JoinAdmissionController {
    pub fn new(
        directory: Arc<dyn DeviceDirectory>,
        emitter: Arc<ControllerEventEmitter>,
        join_timeout: Duration,
    ) -> Self {
        Self {
            queue: Mutex::new(AdmissionQueue::new()),
            directory,
            emitter,
            join_timeout,
        }
    }

    pub fn state(&self) -> AdmissionState {
        self.lock().state()
    }

    pub fn backlog(&self) -> Vec<IeeeAddr> {
        self.lock().backlog()
    }

    /// Hand an announce to the machine. Starts a pipeline task when idle.
    pub fn submit(self: &Arc<Self>, announce: DeviceAnnounce) -> Submission {
        let ieee_addr = announce.ieee_addr;
        let submission = self.lock().submit(announce);
        match &submission {
            Submission::Start(announce) => self.spawn_pipeline(announce.clone()),
            Submission::Queued => debug!("Join of {} queued behind {}", ieee_addr, self.state()),
            Submission::Duplicate => debug!("Join of {} already queued, dropping", ieee_addr),
        }
        submission
    }

    fn spawn_pipeline(self: &Arc<Self>, announce: DeviceAnnounce) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let ieee_addr = announce.ieee_addr;
            // A panic inside the join must still reach `advance` below.
            let worker = Arc::clone(&this);
            let admitted = tokio::spawn(async move { worker.admit(&announce).await }).await;
            match admitted {
                Ok(outcome) => debug!("Join of {} finished: {:?}", ieee_addr, outcome),
                Err(e) => {
                    error!("Join pipeline of {} aborted: {}", ieee_addr, e);
                    this.emitter
                        .notify_error(&format!("Join pipeline of {} aborted", ieee_addr));
                }
            }
            // Scheduled as a fresh task rather than looping inline.
            let next = this.lock().advance();
            if let Some(next) = next {
                this.spawn_pipeline(next);
            }
        });
    }

    async fn admit(&self, announce: &DeviceAnnounce) -> JoinOutcome {
        let ieee_addr = announce.ieee_addr;
        if self.directory.device_status(ieee_addr) == Some(DeviceStatus::Online) {
            debug!("Device {} already in network", ieee_addr);
            return JoinOutcome::AlreadyOnline;
        }

        info!("Device {} associating", ieee_addr);
        self.emitter
            .notify_device_joining(ieee_addr, JoinPhase::Associating);

        // Leaving this scope on any path disarms the timeout.
        let described = time::timeout(self.join_timeout, self.describe(announce)).await;
        let info = match described {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => {
                error!("Cannot describe device {}: {}", ieee_addr, e);
                self.emitter.notify_error(&format!(
                    "Cannot get the Node Descriptor of the Device: {}",
                    ieee_addr
                ));
                self.emitter
                    .notify_device_joining(ieee_addr, JoinPhase::Error);
                return JoinOutcome::QueryFailed;
            }
            Err(_) => {
                warn!(
                    "Join of {} timed out after {:?}",
                    ieee_addr, self.join_timeout
                );
                self.emitter
                    .notify_device_joining(ieee_addr, JoinPhase::Timeout);
                return JoinOutcome::TimedOut;
            }
        };

        match self.directory.device_incoming(info).await {
            Ok(()) => {
                info!("Device {} admitted", ieee_addr);
                JoinOutcome::Admitted
            }
            Err(e) => {
                warn!("Device {} was not accepted: {}", ieee_addr, e);
                JoinOutcome::Rejected
            }
        }
    }

    /// Description query, retried exactly once.
    async fn describe(&self, announce: &DeviceAnnounce) -> ControllerResult<DeviceInfo> {
        let (nwk_addr, ieee_addr) = (announce.nwk_addr, announce.ieee_addr);
        match self.directory.query_device(nwk_addr, ieee_addr).await {
            Ok(info) => Ok(info),
            Err(e) => {
                debug!("Describe {} failed ({}), retrying once", ieee_addr, e);
                self.directory.query_device(nwk_addr, ieee_addr).await
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, AdmissionQueue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}
