// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Controller event notification system.
//!
//! Observers register a [`ControllerListener`] and receive typed
//! notifications for network readiness, permit-join countdown ticks, join
//! admission phases and errors.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::device::IeeeAddr;
use crate::transport::Indication;

/// Unique identifier for a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Phase reported by the `device-joining` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinPhase {
    Associating,
    Timeout,
    Error,
}

/// Trait for components that want to receive controller events.
///
/// All methods have default no-op implementations, so listeners can
/// selectively override only the events they care about. Callbacks run on
/// the controller's tasks and must not block.
pub trait ControllerListener: Send + Sync {
    /// Called when the transport reports the link is ready.
    fn on_network_ready(&self) {}

    /// Called when the transport link closed.
    fn on_network_closed(&self) {}

    /// Called on every permit-join change and countdown tick.
    fn on_permit_join_change(&self, _seconds_left: u8) {}

    /// Called as a device moves through join admission.
    fn on_device_joining(&self, _ieee_addr: IeeeAddr, _phase: JoinPhase) {}

    /// Called for failures that have no caller to return to.
    fn on_error(&self, _message: &str) {}

    /// Called for unsolicited indications the controller does not consume.
    fn on_indication(&self, _indication: &Indication) {}
}

/// Manages registered listeners and dispatches events.
#[derive(Default)]
pub struct ControllerEventEmitter {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ControllerListener>)>>,
}

impl ControllerEventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener to receive events.
    /// Returns an ID that can be used to unregister the listener.
    pub fn register(&self, listener: Arc<dyn ControllerListener>) -> ListenerId {
        let id = ListenerId::new();
        self.write().push((id, listener));
        id
    }

    pub fn unregister(&self, id: ListenerId) {
        self.write().retain(|(lid, _)| *lid != id);
    }

    pub fn listener_count(&self) -> usize {
        self.snapshot().len()
    }

    pub fn notify_network_ready(&self) {
        for listener in self.snapshot() {
            listener.on_network_ready();
        }
    }

    pub fn notify_network_closed(&self) {
        for listener in self.snapshot() {
            listener.on_network_closed();
        }
    }

    pub fn notify_permit_join_change(&self, seconds_left: u8) {
        for listener in self.snapshot() {
            listener.on_permit_join_change(seconds_left);
        }
    }

    pub fn notify_device_joining(&self, ieee_addr: IeeeAddr, phase: JoinPhase) {
        for listener in self.snapshot() {
            listener.on_device_joining(ieee_addr, phase);
        }
    }

    pub fn notify_error(&self, message: &str) {
        for listener in self.snapshot() {
            listener.on_error(message);
        }
    }

    pub fn notify_indication(&self, indication: &Indication) {
        for listener in self.snapshot() {
            listener.on_indication(indication);
        }
    }

    // Listeners are cloned out so a callback may (un)register without deadlock.
    fn snapshot(&self) -> Vec<Arc<dyn ControllerListener>> {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect()
    }

    fn write(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, Vec<(ListenerId, Arc<dyn ControllerListener>)>> {
        self.listeners.write().unwrap_or_else(|e| e.into_inner())
    }
}
