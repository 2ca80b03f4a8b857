// SPDX-FileCopyrightText: © 2026 The tpm2-ops Authors
//
// SPDX-License-Identifier: Apache-2.0

//! Platform Configuration Register operations.

use serde::{Deserialize, Serialize};
use serde_human_bytes as hex_bytes;
use tracing::debug;

use crate::constants::{TpmAlgId, TpmCc, MAX_DIGEST_SIZE, PCR_COUNT, PCR_SELECT_SIZE};
use crate::context::TpmContext;
use crate::error::{Result, TpmError};
use crate::transport::{CommandAuth, CommandBuilder, Transport};
use crate::wire::{Encode, WireBuf};

/// Single-bank PCR selection (TPML_PCR_SELECTION with one entry).
#[derive(Debug, Clone, Copy)]
pub struct PcrSelection {
    pub bank: TpmAlgId,
    bitmap: [u8; PCR_SELECT_SIZE],
}

impl PcrSelection {
    /// Select the given registers of one bank.
    pub fn single_bank(bank: TpmAlgId, indices: &[u32]) -> Result<Self> {
        let mut selection = Self {
            bank,
            bitmap: [0; PCR_SELECT_SIZE],
        };
        for &index in indices {
            selection.select(index)?;
        }
        Ok(selection)
    }

    /// Select registers `0..count` of one bank.
    pub fn first_n(bank: TpmAlgId, count: u32) -> Result<Self> {
        if count > PCR_COUNT {
            return Err(TpmError::CapacityExceeded {
                len: count as usize,
                max: PCR_COUNT as usize,
            });
        }
        let indices: Vec<u32> = (0..count).collect();
        Self::single_bank(bank, &indices)
    }

    fn select(&mut self, index: u32) -> Result<()> {
        if index >= PCR_COUNT {
            return Err(TpmError::Protocol(format!(
                "PCR index {index} out of range (bank has {PCR_COUNT} registers)"
            )));
        }
        self.bitmap[(index / 8) as usize] |= 1 << (index % 8);
        Ok(())
    }

    /// Number of selected registers.
    pub fn count(&self) -> u32 {
        self.bitmap.iter().map(|b| b.count_ones()).sum()
    }
}

impl Encode for PcrSelection {
    fn encode(&self, buf: &mut WireBuf) {
        buf.put_u32(1); // one bank
        buf.put_u16(self.bank.to_u16());
        buf.put_u8(PCR_SELECT_SIZE as u8);
        buf.put_bytes(&self.bitmap);
    }
}

/// The digest of one register of one bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcrValue {
    pub bank: TpmAlgId,
    pub index: u32,
    #[serde(with = "hex_bytes")]
    pub digest: Vec<u8>,
}

impl PcrValue {
    pub fn digest_hex(&self) -> String {
        crate::hexstr::encode(&self.digest)
    }
}

impl<T: Transport> TpmContext<T> {
    /// Extend one PCR of one bank with `data`. The extend value is staged
    /// in a buffer of the largest supported digest size, zero-padded on the
    /// right, then cut to the bank's digest size, the way measurement logs
    /// feed raw event data into a bank.
    pub fn pcr_extend(&mut self, bank: TpmAlgId, index: u32, data: &[u8]) -> Result<()> {
        if index >= PCR_COUNT {
            return Err(TpmError::Protocol(format!(
                "PCR index {index} out of range (bank has {PCR_COUNT} registers)"
            )));
        }
        let digest_size = bank.digest_size();
        if digest_size == 0 {
            return Err(TpmError::Protocol(format!(
                "algorithm {bank:?} is not a PCR bank"
            )));
        }
        if data.len() > MAX_DIGEST_SIZE {
            return Err(TpmError::CapacityExceeded {
                len: data.len(),
                max: MAX_DIGEST_SIZE,
            });
        }

        let mut staged = [0u8; MAX_DIGEST_SIZE];
        staged[..data.len()].copy_from_slice(data);
        let digest = &staged[..digest_size];

        let mut cmd = CommandBuilder::with_sessions(TpmCc::PcrExtend);
        cmd.handle(index)
            .auth(&[CommandAuth::password(None)])
            .u32(1) // TPML_DIGEST_VALUES: one entry
            .u16(bank.to_u16())
            .bytes(digest);

        let response = self.execute(cmd)?;
        response.ensure_success()?;

        debug!(bank = bank.bank_name(), index, "PCR extended");
        Ok(())
    }

    /// Read one PCR of one bank.
    pub fn pcr_read(&mut self, bank: TpmAlgId, index: u32) -> Result<PcrValue> {
        let selection = PcrSelection::single_bank(bank, &[index])?;

        let mut cmd = CommandBuilder::new(TpmCc::PcrRead);
        cmd.arg(&selection);

        let response = self.execute(cmd)?;
        response.ensure_success()?;

        let mut params = response.params()?;
        let _update_counter = params.take_u32()?;

        // TPML_PCR_SELECTION of what was actually read
        let bank_count = params.take_u32()?;
        for _ in 0..bank_count {
            params.skip(2)?; // hash
            let select_size = params.take_u8()? as usize;
            params.skip(select_size)?;
        }

        // TPML_DIGEST holding the selected registers
        let digest_count = params.take_u32()?;
        if digest_count == 0 {
            return Err(TpmError::Protocol(format!(
                "device returned no digest for PCR {index}"
            )));
        }
        let digest = params.take_tpm2b()?;

        Ok(PcrValue {
            bank,
            index,
            digest,
        })
    }
}
