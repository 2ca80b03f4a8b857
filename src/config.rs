// SPDX-FileCopyrightText: © 2026 The tpm2-ops Authors
//
// SPDX-License-Identifier: Apache-2.0

//! Build-time algorithm profile.
//!
//! The asymmetric family, hash bank and session cipher are fixed per build,
//! selected through cargo features. Everything above this module consults
//! these constants instead of taking algorithm parameters.

use crate::constants::{TpmAlgId, TpmEccCurve};

/// Asymmetric family used for every key this layer creates.
#[cfg(not(feature = "ecc"))]
pub const ASYM_ALG: TpmAlgId = TpmAlgId::Rsa;
#[cfg(feature = "ecc")]
pub const ASYM_ALG: TpmAlgId = TpmAlgId::Ecc;

/// Hash algorithm for object names, signing schemes, sessions and PCR banks.
pub const HASH_ALG: TpmAlgId = TpmAlgId::Sha256;

/// Curve for the ECC profile.
pub const CURVE_ID: TpmEccCurve = TpmEccCurve::NistP256;

/// Modulus width for the RSA profile.
pub const RSA_KEY_BITS: u16 = 2048;

/// Session parameter-encryption cipher.
#[cfg(not(feature = "xor-session"))]
pub const SESSION_SYM_ALG: TpmAlgId = TpmAlgId::Aes;
#[cfg(feature = "xor-session")]
pub const SESSION_SYM_ALG: TpmAlgId = TpmAlgId::Xor;
