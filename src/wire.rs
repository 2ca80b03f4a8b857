// SPDX-FileCopyrightText: © 2026 The tpm2-ops Authors
//
// SPDX-License-Identifier: Apache-2.0

//! Byte codec for the command transport collaborator.
//!
//! Only the handful of structures the orchestration layer has to express or
//! inspect are encoded here; everything else travels as opaque TPM2B blobs.

use crate::error::{Result, TpmError};

/// Big-endian writer for command parameters.
#[derive(Debug, Default)]
pub struct WireBuf {
    data: Vec<u8>,
}

impl WireBuf {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.data.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// TPM2B: two-byte size prefix followed by the payload.
    pub fn put_tpm2b(&mut self, data: &[u8]) {
        self.put_u16(data.len() as u16);
        self.put_bytes(data);
    }

    pub fn put_tpm2b_empty(&mut self) {
        self.put_u16(0);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Patch a u32 in place; used for the header size field.
    pub fn patch_u32(&mut self, pos: usize, v: u32) {
        self.data[pos..pos + 4].copy_from_slice(&v.to_be_bytes());
    }
}

/// Checked big-endian reader for response parameters.
#[derive(Debug)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn underflow(&self, what: &str) -> TpmError {
        TpmError::Protocol(format!(
            "response underflow reading {what} ({} bytes left)",
            self.remaining()
        ))
    }

    pub fn take_u8(&mut self) -> Result<u8> {
        if self.remaining() < 1 {
            return Err(self.underflow("u8"));
        }
        let v = self.data[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn take_u16(&mut self) -> Result<u16> {
        if self.remaining() < 2 {
            return Err(self.underflow("u16"));
        }
        let v = u16::from_be_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        Ok(v)
    }

    pub fn take_u32(&mut self) -> Result<u32> {
        if self.remaining() < 4 {
            return Err(self.underflow("u32"));
        }
        let v = u32::from_be_bytes([
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ]);
        self.pos += 4;
        Ok(v)
    }

    pub fn take_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        if self.remaining() < len {
            return Err(self.underflow("bytes"));
        }
        let v = self.data[self.pos..self.pos + len].to_vec();
        self.pos += len;
        Ok(v)
    }

    /// TPM2B: two-byte size prefix followed by the payload.
    pub fn take_tpm2b(&mut self) -> Result<Vec<u8>> {
        let size = self.take_u16()? as usize;
        self.take_bytes(size)
    }

    pub fn take_rest(&mut self) -> Vec<u8> {
        let v = self.data[self.pos..].to_vec();
        self.pos = self.data.len();
        v
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        if self.remaining() < len {
            return Err(self.underflow("skip"));
        }
        self.pos += len;
        Ok(())
    }
}

/// Structures this layer expresses on the wire.
pub trait Encode {
    fn encode(&self, buf: &mut WireBuf);

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = WireBuf::new();
        self.encode(&mut buf);
        buf.into_vec()
    }
}

/// Structures this layer inspects in responses.
pub trait Decode: Sized {
    fn decode(reader: &mut WireReader) -> Result<Self>;

    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(data);
        Self::decode(&mut reader)
    }
}
