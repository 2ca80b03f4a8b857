// SPDX-FileCopyrightText: © 2026 The tpm2-ops Authors
//
// SPDX-License-Identifier: Apache-2.0

//! Non-volatile storage: ordinary byte-blob indices, one chunk at a time.
//!
//! Payloads are capped at the device's NV buffer maximum, so every transfer
//! is a single NV_Read/NV_Write. The indices hold symmetric key material,
//! which is why define, write and read all run under a parameter-encryption
//! session rather than plain password authorization.

use tracing::{debug, warn};

use crate::config;
use crate::constants::{
    handle_type, tpma_session, Hierarchy, SessionKind, TpmCc, TpmHt, TpmaNv,
};
use crate::context::TpmContext;
use crate::error::{Result, TpmError};
use crate::session::Bind;
use crate::transport::{CommandBuilder, Transport};
use crate::wire::{Decode, Encode, WireBuf, WireReader};

/// Reject anything that is not an NV index handle.
fn ensure_nv_handle(handle: u32) -> Result<()> {
    if handle_type(handle) != TpmHt::NvIndex as u8 {
        return Err(TpmError::BadHandle {
            handle,
            expected: "NV index",
        });
    }
    Ok(())
}

/// Public area of an NV index (TPMS_NV_PUBLIC).
#[derive(Debug, Clone)]
pub struct NvPublic {
    pub index: u32,
    pub name_alg: u16,
    pub attributes: TpmaNv,
    pub data_size: u16,
}

impl NvPublic {
    /// Attributes of a freshly defined ordinary index: readable and
    /// writable with the index password, plus the defining hierarchy's
    /// own access bits.
    fn define_attributes(hierarchy: Hierarchy) -> TpmaNv {
        let attrs = match hierarchy {
            Hierarchy::Platform => TpmaNv::new()
                .with_platform_create()
                .with_pp_write()
                .with_pp_read(),
            _ => TpmaNv::new().with_owner_write().with_owner_read(),
        };
        attrs.with_auth_read().with_auth_write()
    }
}

impl Encode for NvPublic {
    fn encode(&self, buf: &mut WireBuf) {
        buf.put_u32(self.index);
        buf.put_u16(self.name_alg);
        buf.put_u32(self.attributes.0);
        buf.put_tpm2b_empty(); // empty auth policy
        buf.put_u16(self.data_size);
    }
}

impl Decode for NvPublic {
    fn decode(reader: &mut WireReader) -> Result<Self> {
        let index = reader.take_u32()?;
        let name_alg = reader.take_u16()?;
        let attributes = TpmaNv(reader.take_u32()?);
        let _auth_policy = reader.take_tpm2b()?;
        let data_size = reader.take_u16()?;
        Ok(Self {
            index,
            name_alg,
            attributes,
            data_size,
        })
    }
}

impl<T: Transport> TpmContext<T> {
    /// Define an ordinary NV index of `size` bytes under the given
    /// hierarchy. The index password is sent over a command-encrypted
    /// session authorized by the hierarchy.
    pub fn nv_define(
        &mut self,
        hierarchy: Hierarchy,
        index: u32,
        size: u16,
        hierarchy_password: Option<&str>,
        index_password: Option<&str>,
    ) -> Result<()> {
        ensure_nv_handle(index)?;

        let public = NvPublic {
            index,
            name_alg: config::HASH_ALG.to_u16(),
            attributes: NvPublic::define_attributes(hierarchy),
            data_size: size,
        };

        self.with_session(
            SessionKind::Hmac,
            Bind::Object(hierarchy.handle(), hierarchy_password),
            |ctx, session| {
                let mut cmd = CommandBuilder::with_sessions(TpmCc::NvDefineSpace);
                cmd.handle(hierarchy.handle())
                    .auth(&[session.auth(tpma_session::DECRYPT)])
                    .tpm2b(index_password.unwrap_or_default().as_bytes())
                    .tpm2b(&public.to_bytes());

                let response = ctx.execute(cmd)?;
                response.ensure_success()
            },
        )?;

        debug!(index = format_args!("0x{index:08x}"), size, "NV index defined");
        Ok(())
    }

    /// Remove an NV index definition and its data.
    pub fn nv_undefine(
        &mut self,
        hierarchy: Hierarchy,
        index: u32,
        hierarchy_password: Option<&str>,
    ) -> Result<()> {
        ensure_nv_handle(index)?;

        self.with_session(
            SessionKind::Hmac,
            Bind::Object(hierarchy.handle(), hierarchy_password),
            |ctx, session| {
                let mut cmd = CommandBuilder::with_sessions(TpmCc::NvUndefineSpace);
                cmd.handle(hierarchy.handle())
                    .handle(index)
                    .auth(&[session.auth(0)]);

                let response = ctx.execute(cmd)?;
                response.ensure_success()
            },
        )?;

        debug!(index = format_args!("0x{index:08x}"), "NV index undefined");
        Ok(())
    }

    /// Public area of an NV index.
    pub fn nv_read_public(&mut self, index: u32) -> Result<NvPublic> {
        ensure_nv_handle(index)?;

        let mut cmd = CommandBuilder::new(TpmCc::NvReadPublic);
        cmd.handle(index);

        let response = self.execute(cmd)?;
        response.ensure_success()?;

        let mut params = response.params()?;
        let public_bytes = params.take_tpm2b()?;
        NvPublic::from_bytes(&public_bytes)
    }

    /// Stored data size of an ordinary NV index; zero for counter, bitfield
    /// and extend indices, whose size is fixed by their type.
    pub fn nv_data_size(&mut self, index: u32) -> Result<usize> {
        let public = self.nv_read_public(index)?;
        if !public.attributes.is_ordinary() {
            warn!(
                index = format_args!("0x{index:08x}"),
                "only ordinary NV indices have variable data size"
            );
            return Ok(0);
        }
        Ok(public.data_size as usize)
    }

    /// Write `data` to an NV index in one chunk at offset zero, command
    /// parameters encrypted. Data longer than the device's NV buffer
    /// maximum is rejected up front.
    pub fn nv_write(&mut self, index: u32, index_password: Option<&str>, data: &[u8]) -> Result<()> {
        ensure_nv_handle(index)?;

        let buffer_max = self.max_nv_buffer_size();
        if data.len() > buffer_max {
            return Err(TpmError::CapacityExceeded {
                len: data.len(),
                max: buffer_max,
            });
        }

        self.with_session(
            SessionKind::Hmac,
            Bind::Object(index, index_password),
            |ctx, session| {
                let mut cmd = CommandBuilder::with_sessions(TpmCc::NvWrite);
                cmd.handle(index)
                    .handle(index)
                    .auth(&[session.auth(tpma_session::DECRYPT)])
                    .tpm2b(data)
                    .u16(0); // offset

                let response = ctx.execute(cmd)?;
                response.ensure_success()
            },
        )?;

        debug!(
            index = format_args!("0x{index:08x}"),
            len = data.len(),
            "NV data written"
        );
        Ok(())
    }

    /// Read the full contents of an ordinary NV index in one chunk,
    /// response parameters encrypted.
    pub fn nv_read(&mut self, index: u32, index_password: Option<&str>) -> Result<Vec<u8>> {
        ensure_nv_handle(index)?;

        let data_size = self.nv_data_size(index)?;
        let buffer_max = self.max_nv_buffer_size();
        if data_size > buffer_max {
            return Err(TpmError::CapacityExceeded {
                len: data_size,
                max: buffer_max,
            });
        }

        let data = self.with_session(
            SessionKind::Hmac,
            Bind::Object(index, index_password),
            |ctx, session| {
                let mut cmd = CommandBuilder::with_sessions(TpmCc::NvRead);
                cmd.handle(index)
                    .handle(index)
                    .auth(&[session.auth(tpma_session::ENCRYPT)])
                    .u16(data_size as u16)
                    .u16(0); // offset

                let response = ctx.execute(cmd)?;
                response.ensure_success()?;

                let mut params = response.params()?;
                params.take_tpm2b()
            },
        )?;

        debug!(
            index = format_args!("0x{index:08x}"),
            len = data.len(),
            "NV data read"
        );
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_index_handles_rejected() {
        let err = ensure_nv_handle(0x81000001).unwrap_err();
        assert!(matches!(err, TpmError::BadHandle { .. }));
        assert!(ensure_nv_handle(0x01c0000a).is_ok());
    }

    #[test]
    fn owner_define_attributes() {
        let attrs = NvPublic::define_attributes(Hierarchy::Owner);
        assert!(attrs.is_ordinary());
        for mask in [
            TpmaNv::OWNER_WRITE,
            TpmaNv::OWNER_READ,
            TpmaNv::AUTH_READ,
            TpmaNv::AUTH_WRITE,
        ] {
            assert_eq!(attrs.0 & mask, mask);
        }
        assert_eq!(attrs.0 & TpmaNv::PLATFORM_CREATE, 0);
    }

    #[test]
    fn platform_define_attributes() {
        let attrs = NvPublic::define_attributes(Hierarchy::Platform);
        for mask in [
            TpmaNv::PLATFORM_CREATE,
            TpmaNv::PP_WRITE,
            TpmaNv::PP_READ,
            TpmaNv::AUTH_READ,
            TpmaNv::AUTH_WRITE,
        ] {
            assert_eq!(attrs.0 & mask, mask);
        }
        assert_eq!(attrs.0 & TpmaNv::OWNER_WRITE, 0);
    }

    #[test]
    fn nv_public_round_trip() {
        let public = NvPublic {
            index: 0x01c0000a,
            name_alg: 0x000B,
            attributes: NvPublic::define_attributes(Hierarchy::Owner),
            data_size: 64,
        };
        let decoded = NvPublic::from_bytes(&public.to_bytes()).unwrap();
        assert_eq!(decoded.index, public.index);
        assert_eq!(decoded.attributes, public.attributes);
        assert_eq!(decoded.data_size, 64);
    }
}
