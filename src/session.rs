// SPDX-FileCopyrightText: © 2026 The tpm2-ops Authors
//
// SPDX-License-Identifier: Apache-2.0

//! Authorization session lifecycle.
//!
//! Sessions are a scarce device-side resource: a handful of slots, exhausted
//! by any leak. Every higher operation therefore goes through
//! [`TpmContext::with_session`], which opens immediately before the guarded
//! commands and flushes exactly once on every exit path.

use tracing::warn;

use crate::config;
use crate::constants::{tpm_rh, SessionKind, TpmAlgId, TpmCc};
use crate::context::TpmContext;
use crate::error::Result;
use crate::transport::{CommandAuth, CommandBuilder, Transport};
use crate::wire::{Encode, WireBuf};

/// Session bind target: unbound sessions can encrypt command parameters but
/// do not authorize access to any particular object.
#[derive(Debug, Clone, Copy)]
pub enum Bind<'a> {
    Unbound,
    Object(u32, Option<&'a str>),
}

/// Symmetric algorithm for session parameter encryption (TPMT_SYM_DEF).
#[derive(Debug, Clone, Copy)]
pub struct SymDef {
    pub algorithm: TpmAlgId,
    pub key_bits: u16,
    pub mode: TpmAlgId,
}

impl SymDef {
    pub fn null() -> Self {
        Self {
            algorithm: TpmAlgId::Null,
            key_bits: 0,
            mode: TpmAlgId::Null,
        }
    }

    pub fn aes_128_cfb() -> Self {
        Self {
            algorithm: TpmAlgId::Aes,
            key_bits: 128,
            mode: TpmAlgId::Cfb,
        }
    }

    /// XOR obfuscation: the key-size union member carries the hash
    /// algorithm identifier instead of a bit width, and there is no mode.
    pub fn xor_keyed(hash: TpmAlgId) -> Self {
        Self {
            algorithm: TpmAlgId::Xor,
            key_bits: hash.to_u16(),
            mode: TpmAlgId::Null,
        }
    }

    /// The cipher configured for this build's sessions.
    pub fn for_session() -> Self {
        match config::SESSION_SYM_ALG {
            TpmAlgId::Xor => Self::xor_keyed(config::HASH_ALG),
            _ => Self::aes_128_cfb(),
        }
    }
}

impl Encode for SymDef {
    fn encode(&self, buf: &mut WireBuf) {
        buf.put_u16(self.algorithm.to_u16());
        match self.algorithm {
            TpmAlgId::Null => {}
            // XOR marshals no mode union member
            TpmAlgId::Xor => buf.put_u16(self.key_bits),
            _ => {
                buf.put_u16(self.key_bits);
                buf.put_u16(self.mode.to_u16());
            }
        }
    }
}

/// A started authorization session.
#[derive(Debug)]
pub struct AuthSession {
    pub handle: u32,
    pub kind: SessionKind,
    bind_auth: Vec<u8>,
}

impl AuthSession {
    /// TPM2_StartAuthSession with the configured session cipher. The bind
    /// secret, when present, accompanies every guarded command's
    /// authorization entry.
    pub fn start<T: Transport>(
        ctx: &mut TpmContext<T>,
        kind: SessionKind,
        bind: Bind<'_>,
    ) -> Result<Self> {
        const NONCE_CALLER: [u8; 16] = [0u8; 16];

        let (bind_handle, bind_auth) = match bind {
            Bind::Unbound => (tpm_rh::NULL, Vec::new()),
            Bind::Object(handle, password) => (
                handle,
                password.unwrap_or_default().as_bytes().to_vec(),
            ),
        };

        let mut cmd = CommandBuilder::new(TpmCc::StartAuthSession);
        cmd.handle(tpm_rh::NULL) // tpmKey: no salt
            .handle(bind_handle)
            .tpm2b(&NONCE_CALLER)
            .tpm2b_empty() // encryptedSalt
            .u8(kind as u8)
            .arg(&SymDef::for_session())
            .u16(config::HASH_ALG.to_u16());

        let response = ctx.execute(cmd)?;
        response.ensure_success()?;

        let mut reader = response.reader();
        let handle = reader.take_u32()?;
        let _nonce_tpm = reader.take_tpm2b()?;

        Ok(Self {
            handle,
            kind,
            bind_auth,
        })
    }

    /// Authorization entry for a guarded command, with the given
    /// parameter-encryption attribute bits.
    pub fn auth(&self, attrs: u8) -> CommandAuth {
        CommandAuth::session(self.handle, attrs, self.bind_auth.clone())
    }

    /// Flush the session. A failure here is usually a harmless double
    /// flush, so it is logged before being handed back to the bracket.
    pub fn flush<T: Transport>(self, ctx: &mut TpmContext<T>) -> Result<()> {
        ctx.flush_handle(self.handle).map_err(|e| {
            warn!(handle = format_args!("0x{:08x}", self.handle),
                  "session flush failed, handle may already be flushed: {e}");
            e
        })
    }
}

impl<T: Transport> TpmContext<T> {
    /// Scoped session bracket: start a session, run `op`, flush exactly
    /// once. If `op` failed its error is returned and the flush outcome is
    /// only logged; if `op` succeeded, a flush failure becomes the
    /// operation's result.
    pub fn with_session<R>(
        &mut self,
        kind: SessionKind,
        bind: Bind<'_>,
        op: impl FnOnce(&mut Self, &AuthSession) -> Result<R>,
    ) -> Result<R> {
        let session = AuthSession::start(self, kind, bind)?;
        let outcome = op(self, &session);
        let flushed = session.flush(self);

        match outcome {
            Err(e) => Err(e),
            Ok(value) => flushed.map(|_| value),
        }
    }
}
