// SPDX-FileCopyrightText: © 2026 The tpm2-ops Authors
//
// SPDX-License-Identifier: Apache-2.0

//! PCR quoting with anti-replay verification.
//!
//! The caller's nonce travels into the device as qualifying data and must
//! come back verbatim in the attestation structure. A quote whose embedded
//! nonce differs from the one sent is rejected here, before any caller sees
//! it, so stale quotes cannot be replayed past this layer.

use serde::{Deserialize, Serialize};
use serde_human_bytes as hex_bytes;
use tracing::debug;

use crate::config;
use crate::constants::{TpmAlgId, TpmCc, TpmSt, TPM_GENERATED_VALUE};
use crate::context::TpmContext;
use crate::error::{Result, TpmError};
use crate::hexstr;
use crate::keys::SigScheme;
use crate::pcr::PcrSelection;
use crate::transport::{CommandAuth, CommandBuilder, Transport};
use crate::wire::{Decode, WireReader};

/// Leading fields of a TPMS_ATTEST produced by TPM2_Quote.
#[derive(Debug, Clone)]
pub struct QuoteAttest {
    pub qualified_signer: Vec<u8>,
    pub extra_data: Vec<u8>,
}

impl Decode for QuoteAttest {
    fn decode(reader: &mut WireReader) -> Result<Self> {
        let magic = reader.take_u32()?;
        if magic != TPM_GENERATED_VALUE {
            return Err(TpmError::Protocol(format!(
                "attestation magic 0x{magic:08x} is not TPM_GENERATED"
            )));
        }
        let attest_type = reader.take_u16()?;
        if attest_type != TpmSt::AttestQuote.to_u16() {
            return Err(TpmError::Protocol(format!(
                "attestation type 0x{attest_type:04x} is not a quote"
            )));
        }
        let qualified_signer = reader.take_tpm2b()?;
        let extra_data = reader.take_tpm2b()?;
        Ok(Self {
            qualified_signer,
            extra_data,
        })
    }
}

/// A verified quote: the marshalled attestation structure and the signature
/// over it, as returned by the device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteResult {
    pub bank: TpmAlgId,
    #[serde(with = "hex_bytes")]
    pub quoted: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

impl QuoteResult {
    pub fn quoted_hex(&self) -> String {
        hexstr::encode(&self.quoted)
    }

    pub fn signature_hex(&self) -> String {
        hexstr::encode(&self.signature)
    }
}

impl<T: Transport> TpmContext<T> {
    /// Quote PCRs `0..pcr_count` of the configured hash bank with a loaded
    /// signing key. The qualifying data arrives as a hex string, the form
    /// attestation requests carry it in; it may be empty. The returned
    /// quote has already had its embedded copy checked against it.
    pub fn quote(
        &mut self,
        key_handle: u32,
        key_password: Option<&str>,
        qualifying_data_hex: &str,
        pcr_count: u32,
    ) -> Result<QuoteResult> {
        let nonce = hexstr::decode(qualifying_data_hex)?;
        let selection = PcrSelection::first_n(config::HASH_ALG, pcr_count)?;

        let mut cmd = CommandBuilder::with_sessions(TpmCc::Quote);
        cmd.handle(key_handle)
            .auth(&[CommandAuth::password(key_password)])
            .tpm2b(&nonce)
            .arg(&SigScheme::for_family())
            .arg(&selection);

        let response = self.execute(cmd)?;
        response.ensure_success()?;

        let mut params = response.params()?;
        let quoted = params.take_tpm2b()?;
        let signature = params.take_rest();

        let attest = QuoteAttest::from_bytes(&quoted)?;
        if attest.extra_data != nonce {
            return Err(TpmError::Verification(
                "quote qualifying data does not match the requested nonce",
            ));
        }

        debug!(
            pcr_count,
            signer = hexstr::encode(&attest.qualified_signer),
            "quote verified"
        );
        Ok(QuoteResult {
            bank: config::HASH_ALG,
            quoted,
            signature,
        })
    }
}
