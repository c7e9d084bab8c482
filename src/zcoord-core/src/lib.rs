// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Coordinator-side control plane for a Z-Stack network processor.
//!
//! The [`Controller`] correlates requests against the serial transport,
//! admits joining devices one at a time, runs reset and NV reconciliation
//! sequences, and keeps local endpoints registered with the firmware.

pub mod config;
pub mod controller;
pub mod device;
pub mod endpoint;
pub mod error;
pub mod nv;
pub mod subsystem;
pub mod transport;

pub use config::ControllerConfig;
pub use controller::{
    AdmissionState, Controller, ControllerListener, JoinPhase, JoinScope, ListenerId,
    NetworkInfo, ResetMode,
};
pub use device::{
    BindTarget, BindingKind, DeviceAnnounce, DeviceDirectory, DeviceInfo, DeviceRef, DeviceStatus,
    EndpointRef, IeeeAddr, RemoveOptions,
};
pub use endpoint::LocalEndpoint;
pub use error::{ControllerError, ControllerResult, TransportError};
pub use nv::{NvConfig, NvItem, NvParams};
pub use subsystem::{Ident, Subsystem};
pub use transport::{Indication, Transport, TransportEvent, ZdoCodec};
