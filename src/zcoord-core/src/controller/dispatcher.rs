// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Single entry point for outgoing requests.
//!
//! Routes management (ZDO) requests through the codec and everything else
//! straight to the transport, then applies per-subsystem status rules.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::{ControllerError, ControllerResult};
use crate::subsystem::{Ident, Subsystem};
use crate::transport::{Transport, ZdoCodec};

const TRACE_TARGET: &str = "zcoord::request";

/// Application transaction id in 1..=255, wrapping to 1.
#[derive(Debug, Default)]
pub struct TransactionCounter(AtomicU8);

impl TransactionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u8 {
        let bump = |id: u8| if id == u8::MAX { 1 } else { id + 1 };
        let prev = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| Some(bump(id)))
            .unwrap_or_else(|id| id);
        bump(prev)
    }
}

pub struct RequestDispatcher {
    transport: Arc<dyn Transport>,
    zdo: Arc<dyn ZdoCodec>,
    trans_id: TransactionCounter,
}

impl RequestDispatcher {
    pub fn new(transport: Arc<dyn Transport>, zdo: Arc<dyn ZdoCodec>) -> Self {
        Self {
            transport,
            zdo,
            trans_id: TransactionCounter::new(),
        }
    }

    pub fn next_trans_id(&self) -> u8 {
        self.trans_id.next()
    }

    /// Issue a request naming the subsystem by name or code.
    pub async fn request(
        &self,
        subsystem: impl Into<Ident>,
        command: impl Into<Ident>,
        args: Value,
    ) -> ControllerResult<Value> {
        let subsystem = subsystem.into();
        subsystem.validate("subsys")?;
        let subsystem = Subsystem::try_from(subsystem)?;
        self.dispatch(subsystem, command, args).await
    }

    /// Boundary adapter for loosely-typed callers.
    pub async fn request_json(
        &self,
        subsystem: &Value,
        command: &Value,
        args: Value,
    ) -> ControllerResult<Value> {
        let subsystem = Ident::try_from(subsystem)
            .map_err(|e| ControllerError::invalid(format!("subsys: {}", e)))?;
        let command = Ident::try_from(command)
            .map_err(|e| ControllerError::invalid(format!("cmdId: {}", e)))?;
        self.request(subsystem, command, args).await
    }

    pub async fn dispatch(
        &self,
        subsystem: Subsystem,
        command: impl Into<Ident>,
        args: Value,
    ) -> ControllerResult<Value> {
        let command = command.into();
        command.validate("cmdId")?;
        if !args.is_object() && !args.is_array() {
            return Err(ControllerError::invalid(
                "valObj should be an object or an array",
            ));
        }

        match args.get("transid").and_then(Value::as_u64) {
            Some(trans_id) if subsystem == Subsystem::Af => debug!(
                target: TRACE_TARGET,
                "REQ --> {}:{}, transId: {}", subsystem, command, trans_id
            ),
            _ => debug!(target: TRACE_TARGET, "REQ --> {}:{}", subsystem, command),
        }

        if subsystem.is_management() {
            // ZDO payloads carry their own status conventions.
            return Ok(self.zdo.request(&command, &args).await?);
        }

        let rsp = self.transport.request(subsystem, &command, &args).await?;
        let Some(status) = rsp.get("status") else {
            debug!(target: TRACE_TARGET, "RSP <-- {}:{}", subsystem, command);
            return Ok(rsp);
        };
        debug!(target: TRACE_TARGET, "RSP <-- {}:{}, status: {}", subsystem, command, status);
        match response_status(&rsp) {
            Some(0) => Ok(rsp),
            Some(code) => Err(ControllerError::RemoteStatus(code)),
            // Anything but a numeric zero is a failure.
            None => Err(ControllerError::Remote(match status.as_str() {
                Some(label) => label.to_string(),
                None => status.to_string(),
            })),
        }
    }
}

/// Numeric `status` field of a response, if present.
pub(crate) fn response_status(rsp: &Value) -> Option<u8> {
    rsp.get("status")
        .and_then(Value::as_u64)
        .map(|s| u8::try_from(s).unwrap_or(u8::MAX))
}

/// Success check for management responses: `0` or `"SUCCESS"`.
pub(crate) fn check_zdo_status(rsp: &Value) -> ControllerResult<()> {
    match rsp.get("status") {
        Some(Value::String(s)) if s == "SUCCESS" => Ok(()),
        Some(Value::String(s)) => Err(ControllerError::Remote(s.clone())),
        Some(status) => match response_status(rsp) {
            Some(0) => Ok(()),
            Some(code) => Err(ControllerError::RemoteStatus(code)),
            None => Err(ControllerError::Remote(status.to_string())),
        },
        None => Err(ControllerError::Remote("missing status".to_string())),
    }
}
