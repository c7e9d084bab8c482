// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Subsystem and command identity.
//!
//! Callers may name a subsystem or command either symbolically (`"SYS"`,
//! `"resetReq"`) or by its numeric code. Internally subsystems are a closed
//! enumeration; commands stay as an [`Ident`] and are resolved by the
//! transport.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ControllerError;

/// Z-Stack MT command subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Subsystem {
    Sys,
    Mac,
    Nwk,
    Af,
    Zdo,
    Sapi,
    Util,
    Dbg,
    App,
}

impl Subsystem {
    const ALL: [Subsystem; 9] = [
        Self::Sys,
        Self::Mac,
        Self::Nwk,
        Self::Af,
        Self::Zdo,
        Self::Sapi,
        Self::Util,
        Self::Dbg,
        Self::App,
    ];

    pub fn code(self) -> u8 {
        match self {
            Self::Sys => 1,
            Self::Mac => 2,
            Self::Nwk => 3,
            Self::Af => 4,
            Self::Zdo => 5,
            Self::Sapi => 6,
            Self::Util => 7,
            Self::Dbg => 8,
            Self::App => 9,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|s| u16::from(s.code()) == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sys => "SYS",
            Self::Mac => "MAC",
            Self::Nwk => "NWK",
            Self::Af => "AF",
            Self::Zdo => "ZDO",
            Self::Sapi => "SAPI",
            Self::Util => "UTIL",
            Self::Dbg => "DBG",
            Self::App => "APP",
        }
    }

    /// The management family encodes success in its own payloads.
    pub fn is_management(self) -> bool {
        matches!(self, Self::Zdo)
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Subsystem {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|sub| sub.name() == upper)
            .ok_or_else(|| ControllerError::invalid(format!("unknown subsystem '{}'", s)))
    }
}

impl TryFrom<Ident> for Subsystem {
    type Error = ControllerError;

    fn try_from(ident: Ident) -> Result<Self, Self::Error> {
        match ident {
            Ident::Name(name) => name.parse(),
            Ident::Code(code) => Self::from_code(code)
                .ok_or_else(|| ControllerError::invalid(format!("unknown subsystem code {}", code))),
        }
    }
}

/// A symbolic name or numeric code, as accepted at the request boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ident {
    Name(String),
    Code(u16),
}

impl Ident {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            Self::Code(_) => None,
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.name() == Some(name)
    }

    pub(crate) fn validate(&self, what: &str) -> Result<(), ControllerError> {
        match self {
            Self::Name(name) if name.trim().is_empty() => Err(ControllerError::invalid(format!(
                "{} should be a non-empty string or a number",
                what
            ))),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Code(code) => write!(f, "{}", code),
        }
    }
}

impl From<&str> for Ident {
    fn from(value: &str) -> Self {
        Self::Name(value.to_string())
    }
}

impl From<String> for Ident {
    fn from(value: String) -> Self {
        Self::Name(value)
    }
}

impl From<u8> for Ident {
    fn from(value: u8) -> Self {
        Self::Code(value.into())
    }
}

impl From<u16> for Ident {
    fn from(value: u16) -> Self {
        Self::Code(value)
    }
}

impl From<Subsystem> for Ident {
    fn from(value: Subsystem) -> Self {
        Self::Name(value.name().to_string())
    }
}

impl TryFrom<&Value> for Ident {
    type Error = ControllerError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(Self::Name(s.clone())),
            Value::Number(n) => n
                .as_u64()
                .and_then(|v| u16::try_from(v).ok())
                .map(Self::Code)
                .ok_or_else(|| ControllerError::invalid(format!("code {} out of range", n))),
            other => Err(ControllerError::invalid(format!(
                "expected a string or a number, got {}",
                other
            ))),
        }
    }
}
