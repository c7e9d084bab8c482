// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration for the coordinator controller.
//!
//! Loaded from the `[zcoord]` section of `zcoord.toml`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use zcoord_app::ConfigFile;

use crate::nv::NvParams;

/// Top-level controller configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// General settings
    pub general: GeneralConfig,
    /// Timers of the join pipeline, reset sequence and permit-join window
    pub timing: TimingConfig,
    /// NV parameters written by the next hard reset
    pub net: NvParams,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Give up on a joining device after this many seconds
    pub join_timeout_secs: u64,
    /// Delay after each NV write/read of a reset or NV check
    pub nv_step_delay_ms: u64,
    /// Upper bound on waiting for the firmware reset indication
    pub reset_timeout_ms: u64,
    /// Node descriptor timeout used by liveness checks
    pub check_online_timeout_ms: u64,
    /// Permit-join countdown tick
    pub permit_join_tick_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            join_timeout_secs: 30,
            nv_step_delay_ms: 10,
            reset_timeout_ms: 10_000,
            check_online_timeout_ms: 5_000,
            permit_join_tick_ms: 1_000,
        }
    }
}

impl TimingConfig {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    pub fn nv_step_delay(&self) -> Duration {
        Duration::from_millis(self.nv_step_delay_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn check_online_timeout(&self) -> Duration {
        Duration::from_millis(self.check_online_timeout_ms)
    }

    pub fn permit_join_tick(&self) -> Duration {
        Duration::from_millis(self.permit_join_tick_ms)
    }
}

impl ControllerConfig {
    /// Generate an example configuration under the `[zcoord]` header.
    pub fn example_toml() -> String {
        #[derive(Serialize)]
        struct Wrapper {
            zcoord: ControllerConfig,
        }
        let example = ControllerConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
            },
            timing: TimingConfig::default(),
            net: NvParams {
                pan_id: Some(0x1a62),
                channel_list: Some(vec![11]),
                precfgkeys_enable: Some(false),
                ..Default::default()
            },
        };
        toml::to_string_pretty(&Wrapper { zcoord: example }).unwrap_or_default()
    }
}

impl ConfigFile for ControllerConfig {
    fn section_key() -> &'static str {
        "zcoord"
    }

    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Some(level) = self.general.log_level.as_deref() {
            if zcoord_app::parse_level(Some(level)).is_none() {
                errors.push(format!(
                    "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
                    level
                ));
            }
        }

        let timing = &self.timing;
        if timing.join_timeout_secs == 0 {
            errors.push("[timing].join_timeout_secs must be > 0".into());
        }
        if timing.reset_timeout_ms == 0 {
            errors.push("[timing].reset_timeout_ms must be > 0".into());
        }
        if timing.check_online_timeout_ms == 0 {
            errors.push("[timing].check_online_timeout_ms must be > 0".into());
        }
        if timing.permit_join_tick_ms == 0 {
            errors.push("[timing].permit_join_tick_ms must be > 0".into());
        }

        if let Err(e) = self.net.validate() {
            errors.push(format!("[net] {}", e));
        }
        if let Some(channels) = &self.net.channel_list {
            if channels.is_empty() {
                errors.push("[net].channelList must not be empty".into());
            }
        }
        errors
    }
}
