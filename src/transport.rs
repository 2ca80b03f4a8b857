// SPDX-FileCopyrightText: © 2026 The tpm2-ops Authors
//
// SPDX-License-Identifier: Apache-2.0

//! Command transport collaborator.
//!
//! The orchestration layer depends on one narrow seam: a [`Transport`] that
//! carries a finished command byte stream to the device and brings the
//! response bytes back. [`TpmDevice`] implements it over the kernel resource
//! manager; test harnesses substitute their own.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use crate::constants::{tpm_rh, tpma_session, TpmCc, TpmSt};
use crate::error::{Result, TpmError};
use crate::wire::{Encode, WireBuf, WireReader};

/// Maximum TPM command/response size.
const TPM_MAX_COMMAND_SIZE: usize = 4096;

/// One channel to a TPM device.
pub trait Transport {
    /// Send a finished command and return the raw response bytes.
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>>;

    /// Cycle platform power: off, on, NV on. Only meaningful for transports
    /// that control the platform (simulators); kernel devices cannot.
    fn power_cycle(&mut self) -> Result<()>;
}

/// Character-device transport over `/dev/tpmrm0` or `/dev/tpm0`.
pub struct TpmDevice {
    file: File,
    path: String,
}

impl TpmDevice {
    pub fn open(path: &str) -> Result<Self> {
        let device_path = path.strip_prefix("device:").unwrap_or(path);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(device_path)?;

        Ok(Self {
            file,
            path: device_path.to_string(),
        })
    }

    /// Open the resource manager if present, the raw device otherwise.
    pub fn detect() -> Result<Self> {
        if Path::new("/dev/tpmrm0").exists() {
            Self::open("/dev/tpmrm0")
        } else if Path::new("/dev/tpm0").exists() {
            Self::open("/dev/tpm0")
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no TPM device found",
            )
            .into())
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Transport for TpmDevice {
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        self.file.write_all(command)?;

        let mut response = vec![0u8; TPM_MAX_COMMAND_SIZE];
        let n = self.file.read(&mut response)?;
        response.truncate(n);
        Ok(response)
    }

    fn power_cycle(&mut self) -> Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "platform power control is not available on a kernel TPM device",
        )
        .into())
    }
}

/// One entry of a command authorization area.
#[derive(Debug, Clone)]
pub struct CommandAuth {
    pub handle: u32,
    pub attrs: u8,
    pub auth: Vec<u8>,
}

impl CommandAuth {
    /// Plain password authorization (TPM_RS_PW).
    pub fn password(password: Option<&str>) -> Self {
        Self {
            handle: tpm_rh::PW,
            attrs: 0,
            auth: password.unwrap_or_default().as_bytes().to_vec(),
        }
    }

    /// Authorization through a started session handle.
    pub fn session(handle: u32, attrs: u8, auth: Vec<u8>) -> Self {
        Self {
            handle,
            attrs: attrs | tpma_session::CONTINUE_SESSION,
            auth,
        }
    }

    fn wire_len(&self) -> u32 {
        // handle + nonce size + attrs + auth size + auth bytes
        (4 + 2 + 1 + 2 + self.auth.len()) as u32
    }
}

/// Assembles header, handles, authorization area and parameters of one
/// command invocation.
pub struct CommandBuilder {
    buf: WireBuf,
}

impl CommandBuilder {
    /// Command without an authorization area.
    pub fn new(code: TpmCc) -> Self {
        Self::with_tag(TpmSt::NoSessions, code)
    }

    /// Command followed by an authorization area.
    pub fn with_sessions(code: TpmCc) -> Self {
        Self::with_tag(TpmSt::Sessions, code)
    }

    fn with_tag(tag: TpmSt, code: TpmCc) -> Self {
        let mut buf = WireBuf::with_capacity(256);
        buf.put_u16(tag.to_u16());
        buf.put_u32(0); // size, patched in finish()
        buf.put_u32(code.to_u32());
        Self { buf }
    }

    pub fn handle(&mut self, handle: u32) -> &mut Self {
        self.buf.put_u32(handle);
        self
    }

    /// Write the authorization area for the given sessions.
    pub fn auth(&mut self, sessions: &[CommandAuth]) -> &mut Self {
        let total: u32 = sessions.iter().map(CommandAuth::wire_len).sum();
        self.buf.put_u32(total);
        for s in sessions {
            self.buf.put_u32(s.handle);
            self.buf.put_u16(0); // empty caller nonce
            self.buf.put_u8(s.attrs);
            self.buf.put_tpm2b(&s.auth);
        }
        self
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.put_u8(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.put_u16(v);
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.put_u32(v);
        self
    }

    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buf.put_bytes(data);
        self
    }

    pub fn tpm2b(&mut self, data: &[u8]) -> &mut Self {
        self.buf.put_tpm2b(data);
        self
    }

    pub fn tpm2b_empty(&mut self) -> &mut Self {
        self.buf.put_tpm2b_empty();
        self
    }

    pub fn arg<T: Encode>(&mut self, value: &T) -> &mut Self {
        value.encode(&mut self.buf);
        self
    }

    /// Patch the size field and return the finished byte stream.
    pub fn finish(mut self) -> Vec<u8> {
        let size = self.buf.len() as u32;
        self.buf.patch_u32(2, size);
        self.buf.into_vec()
    }
}

/// Parsed response header plus the raw payload.
#[derive(Debug)]
pub struct Response {
    pub tag: TpmSt,
    pub rc: u32,
    data: Vec<u8>,
}

impl Response {
    pub fn parse(response: &[u8]) -> Result<Self> {
        if response.len() < 10 {
            return Err(TpmError::Protocol(format!(
                "response too short: {} bytes",
                response.len()
            )));
        }

        let mut reader = WireReader::new(response);
        let tag_raw = reader.take_u16()?;
        let tag = TpmSt::from_u16(tag_raw)
            .ok_or_else(|| TpmError::Protocol(format!("invalid response tag 0x{tag_raw:04x}")))?;

        let size = reader.take_u32()? as usize;
        if response.len() < size {
            return Err(TpmError::Protocol(format!(
                "response size mismatch: header says {}, got {}",
                size,
                response.len()
            )));
        }

        let rc = reader.take_u32()?;

        Ok(Self {
            tag,
            rc,
            data: response[10..size].to_vec(),
        })
    }

    pub fn is_success(&self) -> bool {
        self.rc == 0
    }

    pub fn ensure_success(&self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(TpmError::Tpm { rc: self.rc })
        }
    }

    /// Reader over the full payload, including any output handles.
    pub fn reader(&self) -> WireReader<'_> {
        WireReader::new(&self.data)
    }

    /// Reader over the response parameters of a command without output
    /// handles. For session-tagged responses the parameter-size word bounds
    /// the reader, keeping the trailing authorization area out of reach.
    pub fn params(&self) -> Result<WireReader<'_>> {
        let mut reader = self.reader();
        if self.tag == TpmSt::Sessions {
            let param_size = reader.take_u32()? as usize;
            if param_size > reader.remaining() {
                return Err(TpmError::Protocol(format!(
                    "response parameter size {param_size} exceeds payload"
                )));
            }
            return Ok(WireReader::new(&self.data[4..4 + param_size]));
        }
        Ok(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_header_layout() {
        let mut cmd = CommandBuilder::new(TpmCc::GetRandom);
        cmd.u16(32);
        let bytes = cmd.finish();

        assert_eq!(&bytes[0..2], &[0x80, 0x01]); // TPM_ST_NO_SESSIONS
        assert_eq!(&bytes[6..10], &[0x00, 0x00, 0x01, 0x7B]); // TPM_CC_GetRandom

        let size = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
        assert_eq!(size as usize, bytes.len());
    }

    #[test]
    fn auth_area_layout() {
        let mut cmd = CommandBuilder::with_sessions(TpmCc::NvWrite);
        cmd.handle(0x01c0000a)
            .handle(0x01c0000a)
            .auth(&[CommandAuth::password(Some("pw"))]);
        let bytes = cmd.finish();

        // auth area starts after header (10) + 2 handles (8)
        let area = &bytes[18..];
        let area_size = u32::from_be_bytes([area[0], area[1], area[2], area[3]]);
        assert_eq!(area_size, 4 + 2 + 1 + 2 + 2);
        let handle = u32::from_be_bytes([area[4], area[5], area[6], area[7]]);
        assert_eq!(handle, tpm_rh::PW);
        assert_eq!(&area[area.len() - 2..], b"pw");
    }

    #[test]
    fn response_parse_minimal() {
        let response = [
            0x80, 0x01, // TPM_ST_NO_SESSIONS
            0x00, 0x00, 0x00, 0x0A, // size = 10
            0x00, 0x00, 0x00, 0x00, // TPM_RC_SUCCESS
        ];

        let parsed = Response::parse(&response).unwrap();
        assert!(parsed.is_success());
        assert_eq!(parsed.reader().remaining(), 0);
    }

    #[test]
    fn response_failure_preserves_rc() {
        let response = [
            0x80, 0x01, //
            0x00, 0x00, 0x00, 0x0A, //
            0x00, 0x00, 0x09, 0x8E, // auth fail
        ];

        let parsed = Response::parse(&response).unwrap();
        let err = parsed.ensure_success().unwrap_err();
        assert_eq!(err.response_code(), Some(0x98E));
    }
}
