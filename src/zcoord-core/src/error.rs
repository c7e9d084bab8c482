// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use thiserror::Error;

/// Firmware status: NV item or parameter not found.
pub const STATUS_NOT_FOUND: u8 = 0x02;
/// Firmware status: endpoint id already registered (ZApsDuplicateEntry).
pub const STATUS_DUPLICATE_ENTRY: u8 = 0xb8;

/// Failures reported by the serial transport or the ZDO codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("link closed")]
    Closed,
    #[error("transport error: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum ControllerError {
    /// Malformed caller input, rejected before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("rsp error: {0}")]
    RemoteStatus(u8),

    /// Response carrying a non-numeric failure status.
    #[error("rsp error: {0}")]
    Remote(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("not managed: {0}")]
    NotManaged(String),

    #[error("sequence aborted at {step}: {source}")]
    SequenceAborted {
        step: &'static str,
        #[source]
        source: Box<ControllerError>,
    },

    #[error("timed out waiting for reset indication")]
    ResetTimeout,

    #[error("device query failed: {0}")]
    Query(String),
}

pub type ControllerResult<T> = Result<T, ControllerError>;

impl ControllerError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Numeric firmware status, looking through aborted sequences.
    pub fn status(&self) -> Option<u8> {
        match self {
            Self::RemoteStatus(code) => Some(*code),
            Self::SequenceAborted { source, .. } => source.status(),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Transport(TransportError::Timeout) | Self::ResetTimeout => true,
            Self::SequenceAborted { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}
