// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Seams to the serial transport and the ZDO codec.
//!
//! Framing, checksums and payload layouts live behind these traits. The
//! controller only sees typed requests, correlated responses and a stream of
//! [`TransportEvent`]s.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::device::DeviceAnnounce;
use crate::error::TransportError;
use crate::subsystem::{Ident, Subsystem};

/// Alias to reduce type complexity in Transport and ZdoCodec.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Request/response link to the network processor.
///
/// Each request receives exactly one correlated response or a
/// [`TransportError::Timeout`]; the timeout lives inside the transport.
pub trait Transport: Send + Sync {
    fn open<'a>(&'a self) -> TransportFuture<'a, ()>;

    fn close<'a>(&'a self) -> TransportFuture<'a, ()>;

    fn request<'a>(
        &'a self,
        subsystem: Subsystem,
        command: &'a Ident,
        args: &'a Value,
    ) -> TransportFuture<'a, Value>;
}

/// Encoder/decoder for the management (ZDO) command family.
pub trait ZdoCodec: Send + Sync {
    fn request<'a>(&'a self, command: &'a Ident, args: &'a Value) -> TransportFuture<'a, Value>;
}

/// Events delivered by the transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Ready,
    Closed,
    Unsolicited(Indication),
}

/// Unsolicited indications the controller reacts to.
#[derive(Debug, Clone)]
pub enum Indication {
    /// `ZDO:endDeviceAnnceInd`
    DeviceAnnounce(DeviceAnnounce),
    /// `SYS:resetInd`, the firmware finished a reset.
    ResetInd { reason: u8 },
    /// Anything else, forwarded to listeners untouched.
    Other {
        subsystem: Subsystem,
        command: String,
        payload: Value,
    },
}
