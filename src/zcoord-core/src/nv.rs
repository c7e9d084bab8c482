// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Non-volatile radio configuration.
//!
//! [`NvConfig`] holds the values the hard-reset sequence writes to firmware
//! NV storage and the NV check reads back. [`NvParams`] is the partial,
//! caller-facing form accepted by `set_nv_params`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{ControllerError, ControllerResult};

pub const ZCD_NV_STARTUP_OPTION: u16 = 0x0003;
pub const ZCD_NV_EXTENDED_PAN_ID: u16 = 0x002d;
pub const ZCD_NV_PRECFGKEY: u16 = 0x0062;
pub const ZCD_NV_PRECFGKEYS_ENABLE: u16 = 0x0063;
pub const ZCD_NV_SECURITY_MODE: u16 = 0x0064;
pub const ZCD_NV_PANID: u16 = 0x0083;
pub const ZCD_NV_CHANLIST: u16 = 0x0084;
pub const ZCD_NV_LOGICAL_TYPE: u16 = 0x0087;
pub const ZCD_NV_ZDO_DIRECT_CB: u16 = 0x008f;

/// Startup option bit that makes the firmware discard network state.
pub const STARTOPT_CLEAR_STATE: u8 = 0x02;

/// Lowest and highest 2.4 GHz Zigbee channels.
pub const CHANNEL_MIN: u8 = 11;
pub const CHANNEL_MAX: u8 = 26;

const PRECFGKEY_LEN: usize = 16;

/// Default network key (the well-known development key).
const DEFAULT_PRECFGKEY: [u8; PRECFGKEY_LEN] = [
    0x01, 0x03, 0x05, 0x07, 0x09, 0x0b, 0x0d, 0x0f, 0x00, 0x02, 0x04, 0x06, 0x08, 0x0a, 0x0c, 0x0d,
];

/// One NV record: item id, length and bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NvItem {
    pub id: u16,
    pub len: u8,
    pub value: Vec<u8>,
}

impl NvItem {
    pub fn new(id: u16, value: Vec<u8>) -> Self {
        Self {
            id,
            len: value.len() as u8,
            value,
        }
    }

    fn set_value(&mut self, value: Vec<u8>) {
        self.len = value.len() as u8;
        self.value = value;
    }

    /// `SAPI:writeConfiguration` arguments.
    pub fn write_args(&self) -> Value {
        json!({ "configid": self.id, "len": self.len, "value": self.value })
    }

    /// `SAPI:readConfiguration` arguments.
    pub fn read_args(&self) -> Value {
        json!({ "configid": self.id })
    }

    /// `SYS:osalNvWrite` arguments.
    pub fn osal_write_args(&self) -> Value {
        json!({ "id": self.id, "offset": 0, "len": self.len, "value": self.value })
    }

    /// Compare against the `value` field of a read response.
    pub fn matches_readback(&self, rsp: &Value) -> bool {
        let Some(bytes) = rsp.get("value").and_then(Value::as_array) else {
            return false;
        };
        bytes.len() == self.value.len()
            && bytes
                .iter()
                .zip(&self.value)
                .all(|(got, want)| got.as_u64() == Some(u64::from(*want)))
    }
}

/// Full NV configuration owned by one controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NvConfig {
    pub startup_option: NvItem,
    pub pan_id: NvItem,
    pub ext_pan_id: NvItem,
    pub channel_list: NvItem,
    pub logical_type: NvItem,
    pub precfgkey: NvItem,
    pub precfgkeys_enable: NvItem,
    pub security_mode: NvItem,
    pub zdo_direct_cb: NvItem,
}

impl Default for NvConfig {
    fn default() -> Self {
        Self {
            startup_option: NvItem::new(ZCD_NV_STARTUP_OPTION, vec![0x00]),
            pan_id: NvItem::new(ZCD_NV_PANID, vec![0xff, 0xff]),
            ext_pan_id: NvItem::new(ZCD_NV_EXTENDED_PAN_ID, vec![0xdd; 8]),
            channel_list: NvItem::new(ZCD_NV_CHANLIST, channel_mask_bytes(&[CHANNEL_MIN])),
            // 0x00 coordinator, 0x01 router
            logical_type: NvItem::new(ZCD_NV_LOGICAL_TYPE, vec![0x00]),
            precfgkey: NvItem::new(ZCD_NV_PRECFGKEY, DEFAULT_PRECFGKEY.to_vec()),
            precfgkeys_enable: NvItem::new(ZCD_NV_PRECFGKEYS_ENABLE, vec![0x00]),
            security_mode: NvItem::new(ZCD_NV_SECURITY_MODE, vec![0x01]),
            zdo_direct_cb: NvItem::new(ZCD_NV_ZDO_DIRECT_CB, vec![0x01]),
        }
    }
}

impl NvConfig {
    /// Apply a validated partial update.
    pub fn apply(&mut self, params: &NvParams) -> ControllerResult<()> {
        params.validate()?;

        if let Some(pan_id) = params.pan_id {
            self.pan_id.set_value(pan_id.to_le_bytes().to_vec());
        }
        if let Some(key) = &params.precfgkey {
            self.precfgkey.set_value(key.clone());
        }
        if let Some(enable) = params.precfgkeys_enable {
            self.precfgkeys_enable.set_value(vec![u8::from(enable)]);
        }
        if let Some(clear) = params.startopt_clear_state {
            let option = if clear { STARTOPT_CLEAR_STATE } else { 0x00 };
            self.startup_option.set_value(vec![option]);
        }
        if let Some(channels) = &params.channel_list {
            self.channel_list.set_value(channel_mask_bytes(channels));
        }
        Ok(())
    }

    /// Items verified by the NV check, in read order.
    pub fn verified_items(&self) -> [(&'static str, &NvItem); 4] {
        [
            ("panId", &self.pan_id),
            ("channelList", &self.channel_list),
            ("precfgkey", &self.precfgkey),
            ("precfgkeysEnable", &self.precfgkeys_enable),
        ]
    }
}

/// Partial NV update as accepted from callers and config files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NvParams {
    #[serde(default, alias = "pan_id", skip_serializing_if = "Option::is_none")]
    pub pan_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precfgkey: Option<Vec<u8>>,
    #[serde(default, alias = "precfgkeys_enable", skip_serializing_if = "Option::is_none")]
    pub precfgkeys_enable: Option<bool>,
    #[serde(
        default,
        alias = "startopt_clear_state",
        skip_serializing_if = "Option::is_none"
    )]
    pub startopt_clear_state: Option<bool>,
    #[serde(default, alias = "channel_list", skip_serializing_if = "Option::is_none")]
    pub channel_list: Option<Vec<u8>>,
}

impl NvParams {
    /// Parse a loosely-typed map, rejecting unknown keys and bad values.
    pub fn from_json(value: &Value) -> ControllerResult<Self> {
        if !value.is_object() {
            return Err(ControllerError::invalid("net should be an object"));
        }
        let params: Self = serde_json::from_value(value.clone())
            .map_err(|e| ControllerError::invalid(format!("net: {}", e)))?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> ControllerResult<()> {
        if let Some(key) = &self.precfgkey {
            if key.len() != PRECFGKEY_LEN {
                return Err(ControllerError::invalid(format!(
                    "net.precfgkey should be an array with {} uint8 integers, got {}",
                    PRECFGKEY_LEN,
                    key.len()
                )));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Channel bitmask for a channel list. Channels outside 11..=26 are skipped.
pub fn channel_mask(channels: &[u8]) -> u32 {
    channels.iter().fold(0u32, |mask, &ch| {
        if (CHANNEL_MIN..=CHANNEL_MAX).contains(&ch) {
            mask | (1u32 << ch)
        } else {
            warn!("Ignoring channel {} outside {}..={}", ch, CHANNEL_MIN, CHANNEL_MAX);
            mask
        }
    })
}

fn channel_mask_bytes(channels: &[u8]) -> Vec<u8> {
    channel_mask(channels).to_le_bytes().to_vec()
}
