// SPDX-FileCopyrightText: © 2026 The tpm2-ops Authors
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 command orchestration.
//!
//! This crate drives a TPM 2.0 device through the narrow set of operations
//! a key-storage daemon needs: authorization sessions with parameter
//! encryption, key creation from fixed class templates, PCR extension and
//! quoting with anti-replay verification, single-chunk NV storage, and
//! TPM-backed randomness. Command construction and session sequencing live
//! here; session key derivation and HMAC computation belong to the
//! transport below this layer.
//!
//! All device access goes through a [`TpmContext`] owning a [`Transport`].
//! The default transport is the kernel character device
//! (`/dev/tpmrm0`/`/dev/tpm0`); tests substitute in-memory fakes.
//!
//! ```no_run
//! use tpm2_ops::TpmContext;
//!
//! fn main() -> tpm2_ops::Result<()> {
//!     let mut tpm = TpmContext::open(None)?;
//!     let random = tpm.get_random(32)?;
//!     println!("{}", tpm2_ops::hexstr::encode(&random));
//!     Ok(())
//! }
//! ```

pub mod blob;
pub mod config;
pub mod constants;
mod context;
pub mod error;
pub mod hexstr;
mod keys;
mod nv;
mod pcr;
mod quote;
mod session;
pub mod transport;
pub mod wire;

pub use constants::{Hierarchy, SessionKind, StartupKind, TpmAlgId, TpmaNv, TpmaObject};
pub use context::TpmContext;
pub use error::{Result, TpmError};
pub use keys::{
    build_primary_template, build_template, AsymDetail, CreatedKey, KeyClass, PublicTemplate,
    SigScheme,
};
pub use nv::NvPublic;
pub use pcr::{PcrSelection, PcrValue};
pub use quote::{QuoteAttest, QuoteResult};
pub use session::{AuthSession, Bind, SymDef};
pub use transport::{TpmDevice, Transport};
