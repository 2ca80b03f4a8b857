// SPDX-FileCopyrightText: © 2026 The tpm2-ops Authors
//
// SPDX-License-Identifier: Apache-2.0

//! Device context: the one owned channel to the TPM.
//!
//! The context owns its [`Transport`] and every operation borrows it
//! mutably, so command issuance is serialized by construction. Creating the
//! context opens the channel; dropping it closes the channel. Callers that
//! need cross-thread access wrap the whole context in their own lock.

use tracing::{debug, warn};

use crate::constants::{
    tpm_cap, tpm_pt, tpm_rh, tpma_session, SessionKind, StartupKind, TpmCc,
};
use crate::error::Result;
use crate::session::Bind;
use crate::transport::{CommandAuth, CommandBuilder, Response, TpmDevice, Transport};

/// Fallback when the device will not answer the NV buffer capability query.
const DEFAULT_NV_BUFFER_MAX: usize = 512;

pub struct TpmContext<T: Transport> {
    transport: T,
}

impl TpmContext<TpmDevice> {
    /// Open a context over a kernel TPM device; auto-detects when no path is
    /// given.
    pub fn open(path: Option<&str>) -> Result<Self> {
        let device = match path {
            Some(p) => TpmDevice::open(p)?,
            None => TpmDevice::detect()?,
        };
        Ok(Self::with_transport(device))
    }

    pub fn device_path(&self) -> &str {
        self.transport.path()
    }
}

impl<T: Transport> TpmContext<T> {
    /// Build a context over any transport; tests substitute fakes here.
    pub fn with_transport(transport: T) -> Self {
        Self { transport }
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Transmit one finished command and parse the response header. The
    /// device response code is not checked here; each operation decides.
    pub(crate) fn execute(&mut self, cmd: CommandBuilder) -> Result<Response> {
        let bytes = self.transport.transmit(&cmd.finish())?;
        Response::parse(&bytes)
    }

    // ==================== Initialization sequence ====================

    /// Platform power cycle: off, on, NV on. Must precede `startup`.
    pub fn power_cycle(&mut self) -> Result<()> {
        self.transport.power_cycle()
    }

    /// TPM2_Startup. Must precede `self_test` and every other operation.
    pub fn startup(&mut self, kind: StartupKind) -> Result<()> {
        let mut cmd = CommandBuilder::new(TpmCc::Startup);
        cmd.u16(kind as u16);

        let response = self.execute(cmd)?;
        response.ensure_success()?;
        debug!(?kind, "TPM started up");
        Ok(())
    }

    /// TPM2_SelfTest with the full test suite.
    pub fn self_test(&mut self) -> Result<()> {
        let mut cmd = CommandBuilder::new(TpmCc::SelfTest);
        cmd.u8(1); // fullTest = YES

        let response = self.execute(cmd)?;
        response.ensure_success()?;
        debug!("TPM self test passed");
        Ok(())
    }

    /// TPM2_Clear under lockout authorization. Irreversible: removes all
    /// owner-hierarchy objects and NV indices.
    pub fn clear(&mut self, lockout_password: Option<&str>) -> Result<()> {
        let mut cmd = CommandBuilder::with_sessions(TpmCc::Clear);
        cmd.handle(tpm_rh::LOCKOUT)
            .auth(&[CommandAuth::password(lockout_password)]);

        let response = self.execute(cmd)?;
        response.ensure_success()?;
        debug!("TPM cleared");
        Ok(())
    }

    // ==================== Random ====================

    /// Derive `len` TPM-backed random bytes over a response-encrypted
    /// session. A single GetRandom may return fewer bytes than requested,
    /// so this loops on the shortfall; the session is flushed exactly once
    /// after the loop, success or failure.
    pub fn get_random(&mut self, len: usize) -> Result<Vec<u8>> {
        self.with_session(SessionKind::Hmac, Bind::Unbound, |ctx, session| {
            let mut random = Vec::with_capacity(len);
            while random.len() < len {
                // the request field is 16-bit; larger shortfalls take
                // further loop iterations
                let shortfall = u16::try_from(len - random.len()).unwrap_or(u16::MAX);

                let mut cmd = CommandBuilder::with_sessions(TpmCc::GetRandom);
                cmd.auth(&[session.auth(tpma_session::ENCRYPT)])
                    .u16(shortfall);

                let response = ctx.execute(cmd)?;
                response.ensure_success()?;

                let mut params = response.params()?;
                let chunk = params.take_tpm2b()?;
                if chunk.is_empty() {
                    return Err(crate::error::TpmError::Protocol(
                        "GetRandom returned zero bytes".to_string(),
                    ));
                }
                random.extend_from_slice(&chunk);
            }
            random.truncate(len);
            Ok(random)
        })
    }

    // ==================== Capability / public queries ====================

    /// Largest NV payload the device moves in one NV_Read/NV_Write. Falls
    /// back to a conservative default when the query fails.
    pub fn max_nv_buffer_size(&mut self) -> usize {
        let mut cmd = CommandBuilder::new(TpmCc::GetCapability);
        cmd.u32(tpm_cap::TPM_PROPERTIES)
            .u32(tpm_pt::NV_BUFFER_MAX)
            .u32(1);

        let fallback = DEFAULT_NV_BUFFER_MAX;
        let response = match self.execute(cmd) {
            Ok(r) if r.is_success() => r,
            _ => {
                warn!("NV buffer capability query failed, assuming {fallback}");
                return fallback;
            }
        };

        // moreData, capability, property count, then (property, value) pairs
        let size = response.params().and_then(|mut params| {
            params.take_u8()?;
            params.take_u32()?;
            let count = params.take_u32()?;
            let property = params.take_u32()?;
            let value = params.take_u32()?;
            Ok((count, property, value))
        });

        match size {
            Ok((count, property, value)) if count > 0 && property == tpm_pt::NV_BUFFER_MAX => {
                debug!("NV buffer maximum size is {value}");
                value as usize
            }
            _ => {
                warn!("NV buffer capability missing from response, assuming {fallback}");
                fallback
            }
        }
    }

    /// Read the public area of a loaded or persistent object.
    pub fn read_public(&mut self, handle: u32) -> Result<Vec<u8>> {
        let mut cmd = CommandBuilder::new(TpmCc::ReadPublic);
        cmd.handle(handle);

        let response = self.execute(cmd)?;
        response.ensure_success()?;

        let mut params = response.params()?;
        params.take_tpm2b()
    }

    /// Flush any device-side context (object or session handle).
    pub fn flush_handle(&mut self, handle: u32) -> Result<()> {
        let mut cmd = CommandBuilder::new(TpmCc::FlushContext);
        cmd.handle(handle);

        let response = self.execute(cmd)?;
        response.ensure_success()
    }
}
