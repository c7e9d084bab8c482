// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ControllerError, ControllerResult};

/// AF latency requirement: no latency requirements.
const NO_LATENCY_REQS: u8 = 0;

/// A local application endpoint hosted by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalEndpoint {
    pub id: u8,
    pub profile_id: u16,
    pub device_id: u16,
    pub in_clusters: Vec<u16>,
    pub out_clusters: Vec<u16>,
}

impl LocalEndpoint {
    pub fn new(id: u8, profile_id: u16, device_id: u16) -> Self {
        Self {
            id,
            profile_id,
            device_id,
            in_clusters: Vec::new(),
            out_clusters: Vec::new(),
        }
    }

    pub fn with_clusters(mut self, in_clusters: Vec<u16>, out_clusters: Vec<u16>) -> Self {
        self.in_clusters = in_clusters;
        self.out_clusters = out_clusters;
        self
    }

    /// Application endpoints live in 1..=240; cluster counts are single bytes.
    pub fn validate(&self) -> ControllerResult<()> {
        if !(1..=240).contains(&self.id) {
            return Err(ControllerError::invalid(format!(
                "endpoint id {} outside 1..=240",
                self.id
            )));
        }
        if self.in_clusters.len() > usize::from(u8::MAX)
            || self.out_clusters.len() > usize::from(u8::MAX)
        {
            return Err(ControllerError::invalid(format!(
                "endpoint {} has too many clusters",
                self.id
            )));
        }
        Ok(())
    }

    /// Arguments of an `AF:register` request.
    pub fn registration_args(&self) -> Value {
        json!({
            "endpoint": self.id,
            "appprofid": self.profile_id,
            "appdeviceid": self.device_id,
            "appdevver": 0,
            "latencyreq": NO_LATENCY_REQS,
            "appnuminclusters": self.in_clusters.len(),
            "appinclusterlist": self.in_clusters,
            "appnumoutclusters": self.out_clusters.len(),
            "appoutclusterlist": self.out_clusters,
        })
    }
}
