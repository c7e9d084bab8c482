// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The slice of the device model the controller needs.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::ControllerResult;

/// Alias to reduce type complexity in DeviceDirectory.
pub type DirectoryFuture<'a, T> = Pin<Box<dyn Future<Output = ControllerResult<T>> + Send + 'a>>;

/// 64-bit IEEE (extended) address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IeeeAddr(pub u64);

impl fmt::Display for IeeeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

impl From<u64> for IeeeAddr {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
}

/// Payload of an end-device announce indication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAnnounce {
    pub nwk_addr: u16,
    pub ieee_addr: IeeeAddr,
    pub capabilities: u8,
}

/// A device as seen by operations that target it (remove, liveness).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRef {
    pub nwk_addr: u16,
    pub ieee_addr: IeeeAddr,
    pub status: DeviceStatus,
}

/// Result of the endpoint/profile description query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub nwk_addr: u16,
    pub ieee_addr: IeeeAddr,
    pub endpoints: Vec<u8>,
    #[serde(default)]
    pub description: serde_json::Value,
}

/// Options for `Controller::remove`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveOptions {
    pub rejoin: bool,
    pub remove_children: bool,
}

impl Default for RemoveOptions {
    fn default() -> Self {
        Self {
            rejoin: true,
            remove_children: false,
        }
    }
}

impl RemoveOptions {
    const REJOIN: u8 = 0x01;
    const REMOVE_CHILDREN: u8 = 0x02;

    /// `removechildren_rejoin` field of a leave request.
    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.rejoin {
            flags |= Self::REJOIN;
        }
        if self.remove_children {
            flags |= Self::REMOVE_CHILDREN;
        }
        flags
    }
}

/// Whether a binding entry is added or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingKind {
    Bind,
    Unbind,
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind => f.write_str("bind"),
            Self::Unbind => f.write_str("unbind"),
        }
    }
}

/// An endpoint on a remote device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRef {
    pub nwk_addr: u16,
    pub ieee_addr: IeeeAddr,
    pub endpoint: u8,
}

/// Destination of a binding: another endpoint or a group id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindTarget {
    Endpoint(EndpointRef),
    Group(u16),
}

/// The application's device model, as consumed by join admission.
pub trait DeviceDirectory: Send + Sync {
    /// Status of a tracked device, or `None` if the address is unknown.
    fn device_status(&self, ieee_addr: IeeeAddr) -> Option<DeviceStatus>;

    /// Query the device's endpoints and their simple descriptors.
    fn query_device<'a>(&'a self, nwk_addr: u16, ieee_addr: IeeeAddr)
        -> DirectoryFuture<'a, DeviceInfo>;

    /// Register a described device into the model. `Ok` accepts it.
    fn device_incoming<'a>(&'a self, info: DeviceInfo) -> DirectoryFuture<'a, ()>;

    /// Add or remove a binding of `cluster_id` from `source` to `target`.
    fn set_binding_entry<'a>(
        &'a self,
        kind: BindingKind,
        source: EndpointRef,
        cluster_id: u16,
        target: BindTarget,
    ) -> DirectoryFuture<'a, ()>;
}
