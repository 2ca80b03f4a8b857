// SPDX-FileCopyrightText: © 2026 The tpm2-ops Authors
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 protocol constants: command codes, algorithm identifiers,
//! handles, and attribute bitmasks.

use serde::{Deserialize, Serialize};

/// TPM 2.0 Command Codes (TPM_CC)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TpmCc {
    EvictControl = 0x00000120,
    NvUndefineSpace = 0x00000122,
    Clear = 0x00000126,
    NvDefineSpace = 0x0000012A,
    CreatePrimary = 0x00000131,
    NvWrite = 0x00000137,
    SelfTest = 0x00000143,
    Startup = 0x00000144,
    NvRead = 0x0000014E,
    Create = 0x00000153,
    Load = 0x00000157,
    Quote = 0x00000158,
    FlushContext = 0x00000165,
    NvReadPublic = 0x00000169,
    ReadPublic = 0x00000173,
    StartAuthSession = 0x00000176,
    GetCapability = 0x0000017A,
    GetRandom = 0x0000017B,
    PcrRead = 0x0000017E,
    PcrExtend = 0x00000182,
}

impl TpmCc {
    pub fn to_u32(self) -> u32 {
        self as u32
    }
}

/// TPM 2.0 Algorithm IDs (TPM_ALG_ID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum TpmAlgId {
    Rsa = 0x0001,
    Sha1 = 0x0004,
    Aes = 0x0006,
    KeyedHash = 0x0008,
    Xor = 0x000A,
    Sha256 = 0x000B,
    Sha384 = 0x000C,
    Sha512 = 0x000D,
    Null = 0x0010,
    RsaSsa = 0x0014,
    RsaPss = 0x0016,
    EcDsa = 0x0018,
    Ecc = 0x0023,
    Cfb = 0x0043,
}

impl TpmAlgId {
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x0001 => Some(TpmAlgId::Rsa),
            0x0004 => Some(TpmAlgId::Sha1),
            0x0006 => Some(TpmAlgId::Aes),
            0x0008 => Some(TpmAlgId::KeyedHash),
            0x000A => Some(TpmAlgId::Xor),
            0x000B => Some(TpmAlgId::Sha256),
            0x000C => Some(TpmAlgId::Sha384),
            0x000D => Some(TpmAlgId::Sha512),
            0x0010 => Some(TpmAlgId::Null),
            0x0014 => Some(TpmAlgId::RsaSsa),
            0x0016 => Some(TpmAlgId::RsaPss),
            0x0018 => Some(TpmAlgId::EcDsa),
            0x0023 => Some(TpmAlgId::Ecc),
            0x0043 => Some(TpmAlgId::Cfb),
            _ => None,
        }
    }

    /// Digest length in bytes; zero for non-hash algorithms.
    pub fn digest_size(self) -> usize {
        match self {
            TpmAlgId::Sha1 => 20,
            TpmAlgId::Sha256 => 32,
            TpmAlgId::Sha384 => 48,
            TpmAlgId::Sha512 => 64,
            _ => 0,
        }
    }

    /// PCR bank name for hash algorithms, e.g. "sha256".
    pub fn bank_name(self) -> &'static str {
        match self {
            TpmAlgId::Sha1 => "sha1",
            TpmAlgId::Sha256 => "sha256",
            TpmAlgId::Sha384 => "sha384",
            TpmAlgId::Sha512 => "sha512",
            _ => "unknown",
        }
    }
}

/// Largest digest buffer across all supported hash banks (SHA-512).
pub const MAX_DIGEST_SIZE: usize = 64;

/// Number of PCR registers in a bank.
pub const PCR_COUNT: u32 = 24;

/// Size of the PCR selection bitmap in bytes.
pub const PCR_SELECT_SIZE: usize = 3;

/// TPM 2.0 Permanent Handles
pub mod tpm_rh {
    pub const OWNER: u32 = 0x40000001;
    pub const NULL: u32 = 0x40000007;
    pub const PW: u32 = 0x40000009; // Password authorization
    pub const LOCKOUT: u32 = 0x4000000A;
    pub const ENDORSEMENT: u32 = 0x4000000B;
    pub const PLATFORM: u32 = 0x4000000C;
}

/// TPM 2.0 Handle Types (top byte of a handle)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TpmHt {
    Pcr = 0x00,
    NvIndex = 0x01,
    HmacSession = 0x02,
    PolicySession = 0x03,
    Permanent = 0x40,
    Transient = 0x80,
    Persistent = 0x81,
}

/// Extract the handle-type tag from a handle.
pub fn handle_type(handle: u32) -> u8 {
    (handle >> 24) as u8
}

/// Authorization hierarchies addressable by this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hierarchy {
    Owner,
    Platform,
    Endorsement,
}

impl Hierarchy {
    pub fn handle(self) -> u32 {
        match self {
            Hierarchy::Owner => tpm_rh::OWNER,
            Hierarchy::Platform => tpm_rh::PLATFORM,
            Hierarchy::Endorsement => tpm_rh::ENDORSEMENT,
        }
    }
}

/// TPM 2.0 Session Types (TPM_SE)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionKind {
    Hmac = 0x00,
    Policy = 0x01,
    Trial = 0x03,
}

/// TPM 2.0 Startup Types (TPM_SU)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum StartupKind {
    Clear = 0x0000,
    State = 0x0001,
}

/// Capability selectors used by this layer.
pub mod tpm_cap {
    pub const TPM_PROPERTIES: u32 = 0x00000006;
}

/// Property selectors used by this layer.
pub mod tpm_pt {
    /// Maximum NV data size in one NV_Read/NV_Write command.
    pub const NV_BUFFER_MAX: u32 = 0x0000012C;
}

/// TPM 2.0 Object Attributes (TPMA_OBJECT)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TpmaObject(pub u32);

impl TpmaObject {
    pub const FIXED_TPM: u32 = 1 << 1;
    pub const FIXED_PARENT: u32 = 1 << 4;
    pub const SENSITIVE_DATA_ORIGIN: u32 = 1 << 5;
    pub const USER_WITH_AUTH: u32 = 1 << 6;
    pub const ADMIN_WITH_POLICY: u32 = 1 << 7;
    pub const NO_DA: u32 = 1 << 10;
    pub const RESTRICTED: u32 = 1 << 16;
    pub const DECRYPT: u32 = 1 << 17;
    pub const SIGN: u32 = 1 << 18;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn contains(self, mask: u32) -> bool {
        self.0 & mask == mask
    }

    pub fn with_fixed_tpm(mut self) -> Self {
        self.0 |= Self::FIXED_TPM;
        self
    }

    pub fn with_fixed_parent(mut self) -> Self {
        self.0 |= Self::FIXED_PARENT;
        self
    }

    pub fn with_sensitive_data_origin(mut self) -> Self {
        self.0 |= Self::SENSITIVE_DATA_ORIGIN;
        self
    }

    pub fn with_user_with_auth(mut self) -> Self {
        self.0 |= Self::USER_WITH_AUTH;
        self
    }

    pub fn with_no_da(mut self) -> Self {
        self.0 |= Self::NO_DA;
        self
    }

    pub fn with_restricted(mut self) -> Self {
        self.0 |= Self::RESTRICTED;
        self
    }

    pub fn with_decrypt(mut self) -> Self {
        self.0 |= Self::DECRYPT;
        self
    }

    pub fn with_sign(mut self) -> Self {
        self.0 |= Self::SIGN;
        self
    }

    pub fn without_admin_with_policy(mut self) -> Self {
        self.0 &= !Self::ADMIN_WITH_POLICY;
        self
    }

    pub fn without_restricted(mut self) -> Self {
        self.0 &= !Self::RESTRICTED;
        self
    }

    pub fn without_decrypt(mut self) -> Self {
        self.0 &= !Self::DECRYPT;
        self
    }

    pub fn without_sign(mut self) -> Self {
        self.0 &= !Self::SIGN;
        self
    }
}

/// TPM 2.0 NV Attributes (TPMA_NV)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TpmaNv(pub u32);

impl TpmaNv {
    pub const PP_WRITE: u32 = 1 << 0;
    pub const OWNER_WRITE: u32 = 1 << 1;
    pub const AUTH_WRITE: u32 = 1 << 2;
    pub const POLICY_WRITE: u32 = 1 << 3;
    pub const PP_READ: u32 = 1 << 16;
    pub const OWNER_READ: u32 = 1 << 17;
    pub const AUTH_READ: u32 = 1 << 18;
    pub const POLICY_READ: u32 = 1 << 19;
    pub const PLATFORM_CREATE: u32 = 1 << 30;

    /// Bits 4..7 hold the index type (TPM_NT); ordinary indices are zero.
    const NT_MASK: u32 = 0xF << 4;

    pub fn new() -> Self {
        Self(0)
    }

    /// True for ordinary byte-blob indices (not counter/bitfield/extend).
    pub fn is_ordinary(self) -> bool {
        self.0 & Self::NT_MASK == 0
    }

    pub fn with_pp_write(mut self) -> Self {
        self.0 |= Self::PP_WRITE;
        self
    }

    pub fn with_pp_read(mut self) -> Self {
        self.0 |= Self::PP_READ;
        self
    }

    pub fn with_owner_write(mut self) -> Self {
        self.0 |= Self::OWNER_WRITE;
        self
    }

    pub fn with_owner_read(mut self) -> Self {
        self.0 |= Self::OWNER_READ;
        self
    }

    pub fn with_auth_write(mut self) -> Self {
        self.0 |= Self::AUTH_WRITE;
        self
    }

    pub fn with_auth_read(mut self) -> Self {
        self.0 |= Self::AUTH_READ;
        self
    }

    pub fn with_platform_create(mut self) -> Self {
        self.0 |= Self::PLATFORM_CREATE;
        self
    }
}

/// TPM 2.0 Session Attributes (TPMA_SESSION)
pub mod tpma_session {
    pub const CONTINUE_SESSION: u8 = 1 << 0;
    pub const DECRYPT: u8 = 1 << 5;
    pub const ENCRYPT: u8 = 1 << 6;
}

/// Command/response structure tags (TPM_ST)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TpmSt {
    AttestQuote = 0x8018,
    NoSessions = 0x8001,
    Sessions = 0x8002,
}

impl TpmSt {
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x8001 => Some(TpmSt::NoSessions),
            0x8002 => Some(TpmSt::Sessions),
            0x8018 => Some(TpmSt::AttestQuote),
            _ => None,
        }
    }
}

/// Magic prefix of a TPM-generated attestation structure (TPM_GENERATED).
pub const TPM_GENERATED_VALUE: u32 = 0xFF544347;

/// ECC Curve IDs (TPM_ECC_CURVE)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TpmEccCurve {
    NistP256 = 0x0003,
    NistP384 = 0x0004,
    NistP521 = 0x0005,
}

impl TpmEccCurve {
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// Human-readable decomposition of a TPM response code, for diagnostics.
pub fn describe_rc(rc: u32) -> String {
    if rc == 0 {
        return "success".to_string();
    }
    if rc & 0x80 != 0 {
        // Format-1: parameter number in bits 8..11; handle/session number
        // in bits 8..10 (bit 11 is the session indicator)
        let err = rc & 0x3F;
        if rc & 0x40 != 0 {
            let number = (rc >> 8) & 0xF;
            format!("format-1 error 0x{err:02x} in parameter {number}")
        } else if rc & 0x800 != 0 {
            let number = (rc >> 8) & 0x7;
            format!("format-1 error 0x{err:02x} in session {number}")
        } else {
            let number = (rc >> 8) & 0x7;
            format!("format-1 error 0x{err:02x} in handle {number}")
        }
    } else if rc & 0x900 == 0x900 {
        format!("warning 0x{:02x}", rc & 0x7F)
    } else {
        format!("format-0 error 0x{:02x}", rc & 0x7F)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_type_tags() {
        assert_eq!(handle_type(0x01c0000a), TpmHt::NvIndex as u8);
        assert_eq!(handle_type(0x81000001), TpmHt::Persistent as u8);
        assert_eq!(handle_type(0x03000000), TpmHt::PolicySession as u8);
    }

    #[test]
    fn rc_decomposition() {
        assert_eq!(describe_rc(0), "success");
        // TPM_RC_VALUE (0x84) in parameter 1 => 0x1C4
        assert_eq!(describe_rc(0x1C4), "format-1 error 0x04 in parameter 1");
        // TPM_RC_AUTH_FAIL (0x8E) in session 1 => 0x98E
        assert_eq!(describe_rc(0x98E), "format-1 error 0x0e in session 1");
        // ... and in session 3 => 0xB8E
        assert_eq!(describe_rc(0xB8E), "format-1 error 0x0e in session 3");
        // TPM_RC_HANDLE (0x8B) in handle 2 => 0x28B
        assert_eq!(describe_rc(0x28B), "format-1 error 0x0b in handle 2");
        // TPM_RC_INITIALIZE => 0x100
        assert_eq!(describe_rc(0x100), "format-0 error 0x00");
    }

    #[test]
    fn nv_type_extraction() {
        assert!(TpmaNv::new().with_owner_read().is_ordinary());
        // counter type (TPM_NT = 1) is not ordinary
        assert!(!TpmaNv(1 << 4).is_ordinary());
    }
}
