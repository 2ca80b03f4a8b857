// SPDX-FileCopyrightText: © 2026 The tpm2-ops Authors
//
// SPDX-License-Identifier: Apache-2.0

//! Blob store collaborator: opaque persistence of key material.
//!
//! The caller owns the names; this layer only round-trips bytes.

use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::hexstr;

/// Persist a marshalled structure.
pub fn write_blob(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes)?;
    Ok(())
}

/// Read back a previously persisted structure.
pub fn read_blob(path: &Path) -> Result<Vec<u8>> {
    Ok(fs::read(path)?)
}

/// Read an arbitrary binary file and return its hex representation.
pub fn read_file_to_hex(path: &Path) -> Result<String> {
    Ok(hexstr::encode(&fs::read(path)?))
}
