// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::endpoint::LocalEndpoint;
use crate::error::{ControllerError, ControllerResult, STATUS_DUPLICATE_ENTRY};
use crate::subsystem::Subsystem;

use super::dispatcher::RequestDispatcher;

/// Local endpoints registered with the firmware, keyed by endpoint id.
pub struct EndpointRegistry {
    dispatcher: Arc<RequestDispatcher>,
    tracked: Mutex<BTreeMap<u8, LocalEndpoint>>,
}

impl EndpointRegistry {
    pub fn new(dispatcher: Arc<RequestDispatcher>) -> Self {
        Self {
            dispatcher,
            tracked: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn endpoints(&self) -> Vec<LocalEndpoint> {
        self.lock().values().cloned().collect()
    }

    pub fn is_tracked(&self, id: u8) -> bool {
        self.lock().contains_key(&id)
    }

    /// Register `ep`, recovering from a busy endpoint id by re-registering.
    pub async fn register_ep(&self, ep: &LocalEndpoint) -> ControllerResult<Value> {
        ep.validate()?;
        let previous = self.lock().insert(ep.id, ep.clone());

        match self.send_register(ep).await {
            Ok(rsp) => Ok(rsp),
            Err(e) if e.status() == Some(STATUS_DUPLICATE_ENTRY) => {
                warn!("Endpoint {} already registered, re-registering", ep.id);
                self.re_register_ep(ep).await
            }
            Err(e) => {
                let mut tracked = self.lock();
                match previous {
                    Some(previous) => tracked.insert(ep.id, previous),
                    None => tracked.remove(&ep.id),
                };
                Err(e)
            }
        }
    }

    pub async fn deregister_ep(&self, ep: &LocalEndpoint) -> ControllerResult<Value> {
        if !self.is_tracked(ep.id) {
            return Err(ControllerError::NotManaged(format!(
                "endpoint {} is not managed by the coordinator",
                ep.id
            )));
        }

        let rsp = self
            .dispatcher
            .dispatch(Subsystem::Af, "delete", json!({ "endpoint": ep.id }))
            .await?;
        self.lock().remove(&ep.id);
        info!("Endpoint {} deregistered", ep.id);
        Ok(rsp)
    }

    pub async fn re_register_ep(&self, ep: &LocalEndpoint) -> ControllerResult<Value> {
        ep.validate()?;
        self.deregister_ep(ep).await?;
        let rsp = self.send_register(ep).await?;
        self.lock().insert(ep.id, ep.clone());
        Ok(rsp)
    }

    async fn send_register(&self, ep: &LocalEndpoint) -> ControllerResult<Value> {
        let rsp = self
            .dispatcher
            .dispatch(Subsystem::Af, "register", ep.registration_args())
            .await?;
        info!("Endpoint {} registered (profile 0x{:04x})", ep.id, ep.profile_id);
        Ok(rsp)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<u8, LocalEndpoint>> {
        self.tracked.lock().unwrap_or_else(|e| e.into_inner())
    }
}
