// SPDX-FileCopyrightText: © 2026 The tpm2-ops Authors
//
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the orchestration layer.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TpmError>;

#[derive(Debug, Error)]
pub enum TpmError {
    /// Transport-level I/O failure while talking to the device.
    #[error("transport failure: {0}")]
    Io(#[from] std::io::Error),

    /// The device answered, but the response violates the wire contract.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Non-success response code reported by the device.
    #[error("TPM error 0x{rc:08x}: {}", crate::constants::describe_rc(*rc))]
    Tpm { rc: u32 },

    /// Handle tag does not match the expected handle namespace.
    #[error("bad handle 0x{handle:08x}: expected a {expected} handle")]
    BadHandle { handle: u32, expected: &'static str },

    /// Payload or selection larger than the device or design limit.
    #[error("capacity exceeded: {len} exceeds limit of {max}")]
    CapacityExceeded { len: usize, max: usize },

    /// Locally performed verification of a device response failed.
    #[error("verification failed: {0}")]
    Verification(&'static str),

    #[error("invalid hex input: {0}")]
    Hex(#[from] hex::FromHexError),
}

impl TpmError {
    /// Raw device response code, when this error carries one.
    pub fn response_code(&self) -> Option<u32> {
        match self {
            TpmError::Tpm { rc } => Some(*rc),
            _ => None,
        }
    }
}
