// SPDX-FileCopyrightText: © 2026 The tpm2-ops Authors
//
// SPDX-License-Identifier: Apache-2.0

//! Key classes, object templates and key lifecycle operations.
//!
//! All keys use password-only authorization with an empty policy digest.
//! The four key classes form a closed enumeration; the template builder
//! matches them exhaustively, so there is no "unsupported class" failure at
//! runtime.

use std::path::Path;

use tracing::debug;

use crate::blob;
use crate::config;
use crate::constants::{handle_type, Hierarchy, TpmAlgId, TpmCc, TpmHt, TpmaObject};
use crate::context::TpmContext;
use crate::error::{Result, TpmError};
use crate::session::SymDef;
use crate::transport::{CommandAuth, CommandBuilder, Transport};
use crate::wire::{Encode, WireBuf};

/// The key classes this layer creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    StorageUnrestricted,
    StorageRestricted,
    SigningUnrestricted,
    SigningRestricted,
}

impl KeyClass {
    pub fn is_restricted(self) -> bool {
        matches!(self, KeyClass::StorageRestricted | KeyClass::SigningRestricted)
    }

    pub fn is_signing(self) -> bool {
        matches!(self, KeyClass::SigningUnrestricted | KeyClass::SigningRestricted)
    }
}

/// Signing scheme selector (TPMT_RSA_SCHEME / TPMT_ECC_SCHEME /
/// TPMT_SIG_SCHEME share this shape).
#[derive(Debug, Clone, Copy)]
pub struct SigScheme {
    pub scheme: TpmAlgId,
    pub hash: Option<TpmAlgId>,
}

impl SigScheme {
    pub fn null() -> Self {
        Self {
            scheme: TpmAlgId::Null,
            hash: None,
        }
    }

    /// The signing scheme of the configured asymmetric family.
    pub fn for_family() -> Self {
        let scheme = match config::ASYM_ALG {
            TpmAlgId::Ecc => TpmAlgId::EcDsa,
            _ => TpmAlgId::RsaSsa,
        };
        Self {
            scheme,
            hash: Some(config::HASH_ALG),
        }
    }
}

impl Encode for SigScheme {
    fn encode(&self, buf: &mut WireBuf) {
        buf.put_u16(self.scheme.to_u16());
        if let Some(hash) = self.hash {
            buf.put_u16(hash.to_u16());
        }
    }
}

/// Algorithm-specific detail block of a public template.
#[derive(Debug, Clone)]
pub enum AsymDetail {
    Rsa {
        symmetric: SymDef,
        scheme: SigScheme,
        key_bits: u16,
        exponent: u32,
    },
    Ecc {
        symmetric: SymDef,
        scheme: SigScheme,
        curve: u16,
        kdf: TpmAlgId,
    },
}

impl AsymDetail {
    pub fn symmetric(&self) -> &SymDef {
        match self {
            AsymDetail::Rsa { symmetric, .. } => symmetric,
            AsymDetail::Ecc { symmetric, .. } => symmetric,
        }
    }

    pub fn scheme(&self) -> &SigScheme {
        match self {
            AsymDetail::Rsa { scheme, .. } => scheme,
            AsymDetail::Ecc { scheme, .. } => scheme,
        }
    }
}

impl Encode for AsymDetail {
    fn encode(&self, buf: &mut WireBuf) {
        match self {
            AsymDetail::Rsa {
                symmetric,
                scheme,
                key_bits,
                exponent,
            } => {
                symmetric.encode(buf);
                scheme.encode(buf);
                buf.put_u16(*key_bits);
                buf.put_u32(*exponent);
            }
            AsymDetail::Ecc {
                symmetric,
                scheme,
                curve,
                kdf,
            } => {
                symmetric.encode(buf);
                scheme.encode(buf);
                buf.put_u16(*curve);
                buf.put_u16(kdf.to_u16());
            }
        }
    }
}

/// Complete object template (TPMT_PUBLIC) before creation.
#[derive(Debug, Clone)]
pub struct PublicTemplate {
    pub type_alg: TpmAlgId,
    pub name_alg: TpmAlgId,
    pub attributes: TpmaObject,
    pub detail: AsymDetail,
}

impl Encode for PublicTemplate {
    fn encode(&self, buf: &mut WireBuf) {
        buf.put_u16(self.type_alg.to_u16());
        buf.put_u16(self.name_alg.to_u16());
        buf.put_u32(self.attributes.0);
        buf.put_tpm2b_empty(); // empty auth policy: password-only design
        self.detail.encode(buf);
        // unique: zero-size placeholders the device fills in
        match self.detail {
            AsymDetail::Rsa { .. } => buf.put_tpm2b_empty(),
            AsymDetail::Ecc { .. } => {
                buf.put_tpm2b_empty();
                buf.put_tpm2b_empty();
            }
        }
    }
}

/// Build the object template for a key class.
///
/// Restricted classes carry an AES-128-CFB symmetric block, unrestricted
/// classes a null one. Only restricted signing keys get a concrete signing
/// scheme; everything else leaves scheme selection to the point of use.
/// NODA is deliberately left unset here; primary keys force it.
pub fn build_template(class: KeyClass, extra_attrs: TpmaObject) -> PublicTemplate {
    let mut attrs = extra_attrs
        .with_sensitive_data_origin()
        .with_user_with_auth()
        .without_admin_with_policy();

    attrs = if class.is_signing() {
        attrs.with_sign().without_decrypt()
    } else {
        attrs.with_decrypt().without_sign()
    };
    attrs = if class.is_restricted() {
        attrs.with_restricted()
    } else {
        attrs.without_restricted()
    };

    let symmetric = if class.is_restricted() {
        SymDef::aes_128_cfb()
    } else {
        SymDef::null()
    };
    let scheme = if class == KeyClass::SigningRestricted {
        SigScheme::for_family()
    } else {
        SigScheme::null()
    };

    PublicTemplate {
        type_alg: config::ASYM_ALG,
        name_alg: config::HASH_ALG,
        attributes: attrs,
        detail: family_detail(symmetric, scheme),
    }
}

#[cfg(not(feature = "ecc"))]
fn family_detail(symmetric: SymDef, scheme: SigScheme) -> AsymDetail {
    AsymDetail::Rsa {
        symmetric,
        scheme,
        key_bits: config::RSA_KEY_BITS,
        exponent: 0, // device default
    }
}

#[cfg(feature = "ecc")]
fn family_detail(symmetric: SymDef, scheme: SigScheme) -> AsymDetail {
    AsymDetail::Ecc {
        symmetric,
        scheme,
        curve: config::CURVE_ID.to_u16(),
        kdf: TpmAlgId::Null,
    }
}

/// Template for a primary key: the class template with the storage-root
/// override on top. A primary is always a non-duplicable decryption key,
/// immune to dictionary-attack lockout, whatever the requested class says.
pub fn build_primary_template(class: KeyClass) -> PublicTemplate {
    let mut template = build_template(class, TpmaObject::new());
    template.attributes = template
        .attributes
        .with_no_da()
        .with_fixed_tpm()
        .with_fixed_parent()
        .with_restricted()
        .with_decrypt()
        .without_sign();
    template
}

/// TPM2B_SENSITIVE_CREATE carrying the key password and no seed data.
fn sensitive_create(password: Option<&str>) -> Vec<u8> {
    let mut inner = WireBuf::new();
    inner.put_tpm2b(password.unwrap_or_default().as_bytes());
    inner.put_tpm2b_empty(); // no caller-supplied sensitive data
    inner.into_vec()
}

/// Private/public blob pair of a created key.
#[derive(Debug, Clone)]
pub struct CreatedKey {
    pub private: Vec<u8>,
    pub public: Vec<u8>,
}

impl<T: Transport> TpmContext<T> {
    /// Create a primary key under the given hierarchy and return its
    /// transient handle. The public area is optionally persisted to
    /// `public_sink`.
    pub fn create_primary(
        &mut self,
        hierarchy: Hierarchy,
        class: KeyClass,
        hierarchy_password: Option<&str>,
        key_password: Option<&str>,
        public_sink: Option<&Path>,
    ) -> Result<u32> {
        let template = build_primary_template(class);

        let mut cmd = CommandBuilder::with_sessions(TpmCc::CreatePrimary);
        cmd.handle(hierarchy.handle())
            .auth(&[CommandAuth::password(hierarchy_password)])
            .tpm2b(&sensitive_create(key_password))
            .tpm2b(&template.to_bytes())
            .tpm2b_empty() // outsideInfo
            .u32(0); // creationPCR: empty selection list

        let response = self.execute(cmd)?;
        response.ensure_success()?;

        // output handle precedes the parameter size word
        let mut reader = response.reader();
        let handle = reader.take_u32()?;
        let _param_size = reader.take_u32()?;
        let out_public = reader.take_tpm2b()?;

        if let Some(path) = public_sink {
            blob::write_blob(path, &out_public)?;
        }

        debug!(handle = format_args!("0x{handle:08x}"), "created primary key");
        Ok(handle)
    }

    /// Create a child key under a loaded parent. Both blobs are returned
    /// and optionally persisted.
    #[allow(clippy::too_many_arguments)]
    pub fn create_key(
        &mut self,
        parent_handle: u32,
        class: KeyClass,
        extra_attrs: TpmaObject,
        parent_password: Option<&str>,
        key_password: Option<&str>,
        private_sink: Option<&Path>,
        public_sink: Option<&Path>,
    ) -> Result<CreatedKey> {
        let template = build_template(class, extra_attrs);

        let mut cmd = CommandBuilder::with_sessions(TpmCc::Create);
        cmd.handle(parent_handle)
            .auth(&[CommandAuth::password(parent_password)])
            .tpm2b(&sensitive_create(key_password))
            .tpm2b(&template.to_bytes())
            .tpm2b_empty() // outsideInfo
            .u32(0); // creationPCR

        let response = self.execute(cmd)?;
        response.ensure_success()?;

        let mut params = response.params()?;
        let private = params.take_tpm2b()?;
        let public = params.take_tpm2b()?;

        if let Some(path) = private_sink {
            blob::write_blob(path, &private)?;
        }
        if let Some(path) = public_sink {
            blob::write_blob(path, &public)?;
        }

        debug!(parent = format_args!("0x{parent_handle:08x}"), "created child key");
        Ok(CreatedKey { private, public })
    }

    /// Load previously persisted key blobs back into a device handle.
    pub fn load_key(
        &mut self,
        parent_handle: u32,
        parent_password: Option<&str>,
        private_source: &Path,
        public_source: &Path,
    ) -> Result<u32> {
        let private = blob::read_blob(private_source)?;
        let public = blob::read_blob(public_source)?;

        let mut cmd = CommandBuilder::with_sessions(TpmCc::Load);
        cmd.handle(parent_handle)
            .auth(&[CommandAuth::password(parent_password)])
            .tpm2b(&private)
            .tpm2b(&public);

        let response = self.execute(cmd)?;
        response.ensure_success()?;

        let mut reader = response.reader();
        let handle = reader.take_u32()?;

        debug!(handle = format_args!("0x{handle:08x}"), "loaded key");
        Ok(handle)
    }

    /// Make a transient object persistent, or drop a persistent mapping
    /// (same handle passed as both object and persistent handle).
    pub fn evict(
        &mut self,
        auth_hierarchy: Hierarchy,
        auth_password: Option<&str>,
        object_handle: u32,
        persistent_handle: u32,
    ) -> Result<()> {
        if handle_type(persistent_handle) != TpmHt::Persistent as u8 {
            return Err(TpmError::BadHandle {
                handle: persistent_handle,
                expected: "persistent",
            });
        }

        let mut cmd = CommandBuilder::with_sessions(TpmCc::EvictControl);
        cmd.handle(auth_hierarchy.handle())
            .handle(object_handle)
            .auth(&[CommandAuth::password(auth_password)])
            .handle(persistent_handle);

        let response = self.execute(cmd)?;
        response.ensure_success()?;

        debug!(
            persistent = format_args!("0x{persistent_handle:08x}"),
            "evict control done"
        );
        Ok(())
    }
}
