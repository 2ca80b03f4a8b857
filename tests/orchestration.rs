// SPDX-FileCopyrightText: © 2026 The tpm2-ops Authors
//
// SPDX-License-Identifier: Apache-2.0

//! Session, NV and quote orchestration against an in-memory TPM fake.
//!
//! The fake speaks just enough of the wire protocol to answer the commands
//! this layer issues, while counting session opens and flushes so the tests
//! can prove that no device-side handle ever leaks.

use std::collections::{HashMap, HashSet};

use tpm2_ops::constants::{tpm_rh, TpmCc};
use tpm2_ops::wire::{Decode, WireBuf, WireReader};
use tpm2_ops::{
    Hierarchy, KeyClass, StartupKind, TpmAlgId, TpmContext, TpmError, TpmaObject, Transport,
};

const RC_HANDLE: u32 = 0x18B;
const RC_NV_RANGE: u32 = 0x146;
const RC_INITIALIZE: u32 = 0x100;

struct NvSpace {
    data_size: u16,
    attributes: u32,
    data: Vec<u8>,
}

/// In-memory TPM double. Allocates session and object handles, stores NV
/// data, and logs every command it sees.
struct FakeTpm {
    sessions: HashSet<u32>,
    objects: HashSet<u32>,
    nv: HashMap<u32, NvSpace>,
    pcrs: HashMap<u32, Vec<u8>>,
    next_session: u32,
    next_object: u32,
    sessions_started: usize,
    flush_calls: usize,
    random_calls: usize,
    commands: Vec<u32>,
    /// (command code, auth handle, session attributes) per auth entry seen.
    auth_log: Vec<(u32, u32, u8)>,
    /// Commands forced to fail with a given response code.
    fail_rc: HashMap<u32, u32>,
    tamper_quote_nonce: bool,
    empty_random: bool,
    nv_buffer_max: u32,
    power_cycles: usize,
}

impl FakeTpm {
    fn new() -> Self {
        Self {
            sessions: HashSet::new(),
            objects: HashSet::new(),
            nv: HashMap::new(),
            pcrs: HashMap::new(),
            next_session: 0,
            next_object: 0,
            sessions_started: 0,
            flush_calls: 0,
            random_calls: 0,
            commands: Vec::new(),
            auth_log: Vec::new(),
            fail_rc: HashMap::new(),
            tamper_quote_nonce: false,
            empty_random: false,
            nv_buffer_max: 1024,
            power_cycles: 0,
        }
    }

    fn fail_command(mut self, cc: TpmCc, rc: u32) -> Self {
        self.fail_rc.insert(cc.to_u32(), rc);
        self
    }

    fn count(&self, cc: TpmCc) -> usize {
        self.commands.iter().filter(|&&c| c == cc.to_u32()).count()
    }

    fn parse_auth_area(&mut self, cc: u32, reader: &mut WireReader) -> Result<(), Vec<u8>> {
        let area_size = reader.take_u32().unwrap() as usize;
        let mut consumed = 0;
        while consumed < area_size {
            let handle = reader.take_u32().unwrap();
            let nonce = reader.take_tpm2b().unwrap();
            let attrs = reader.take_u8().unwrap();
            let auth = reader.take_tpm2b().unwrap();
            consumed += 4 + 2 + nonce.len() + 1 + 2 + auth.len();

            self.auth_log.push((cc, handle, attrs));
            if handle != tpm_rh::PW && !self.sessions.contains(&handle) {
                return Err(fail(RC_HANDLE));
            }
        }
        Ok(())
    }
}

fn fail(rc: u32) -> Vec<u8> {
    let mut buf = WireBuf::new();
    buf.put_u16(0x8001);
    buf.put_u32(10);
    buf.put_u32(rc);
    buf.into_vec()
}

fn ok_no_sessions(params: &[u8]) -> Vec<u8> {
    let mut buf = WireBuf::new();
    buf.put_u16(0x8001);
    buf.put_u32((10 + params.len()) as u32);
    buf.put_u32(0);
    buf.put_bytes(params);
    buf.into_vec()
}

fn ok_sessions(handles: &[u32], params: &[u8]) -> Vec<u8> {
    // auth response ack: empty nonce, continueSession, empty hmac
    let ack: [u8; 5] = [0x00, 0x00, 0x01, 0x00, 0x00];
    let size = 10 + handles.len() * 4 + 4 + params.len() + ack.len();

    let mut buf = WireBuf::new();
    buf.put_u16(0x8002);
    buf.put_u32(size as u32);
    buf.put_u32(0);
    for h in handles {
        buf.put_u32(*h);
    }
    buf.put_u32(params.len() as u32);
    buf.put_bytes(params);
    buf.put_bytes(&ack);
    buf.into_vec()
}

impl Transport for FakeTpm {
    fn transmit(&mut self, command: &[u8]) -> tpm2_ops::Result<Vec<u8>> {
        let mut reader = WireReader::new(command);
        let _tag = reader.take_u16().unwrap();
        let _size = reader.take_u32().unwrap();
        let cc = reader.take_u32().unwrap();
        self.commands.push(cc);

        if cc == TpmCc::FlushContext.to_u32() {
            self.flush_calls += 1;
        }
        if let Some(&rc) = self.fail_rc.get(&cc) {
            return Ok(fail(rc));
        }

        let response = if cc == TpmCc::Startup.to_u32() || cc == TpmCc::SelfTest.to_u32() {
            ok_no_sessions(&[])
        } else if cc == TpmCc::Clear.to_u32() {
            let _lockout = reader.take_u32().unwrap();
            if let Err(r) = self.parse_auth_area(cc, &mut reader) {
                return Ok(r);
            }
            ok_sessions(&[], &[])
        } else if cc == TpmCc::StartAuthSession.to_u32() {
            let _tpm_key = reader.take_u32().unwrap();
            let _bind = reader.take_u32().unwrap();
            let handle = 0x0200_0000 + self.next_session;
            self.next_session += 1;
            self.sessions.insert(handle);
            self.sessions_started += 1;

            let mut params = WireBuf::new();
            params.put_u32(handle);
            params.put_tpm2b(&[0x5C; 16]); // nonceTPM
            ok_no_sessions(params.as_slice())
        } else if cc == TpmCc::FlushContext.to_u32() {
            let handle = reader.take_u32().unwrap();
            if self.sessions.remove(&handle) || self.objects.remove(&handle) {
                ok_no_sessions(&[])
            } else {
                fail(RC_HANDLE)
            }
        } else if cc == TpmCc::GetRandom.to_u32() {
            if let Err(r) = self.parse_auth_area(cc, &mut reader) {
                return Ok(r);
            }
            self.random_calls += 1;
            let requested = reader.take_u16().unwrap() as usize;
            let chunk = if self.empty_random {
                Vec::new()
            } else {
                vec![self.random_calls as u8; requested.min(32)]
            };
            let mut params = WireBuf::new();
            params.put_tpm2b(&chunk);
            ok_sessions(&[], params.as_slice())
        } else if cc == TpmCc::GetCapability.to_u32() {
            let _capability = reader.take_u32().unwrap();
            let property = reader.take_u32().unwrap();
            let mut params = WireBuf::new();
            params.put_u8(0); // moreData
            params.put_u32(6); // TPM_CAP_TPM_PROPERTIES
            params.put_u32(1);
            params.put_u32(property);
            params.put_u32(self.nv_buffer_max);
            ok_no_sessions(params.as_slice())
        } else if cc == TpmCc::NvDefineSpace.to_u32() {
            let _auth_handle = reader.take_u32().unwrap();
            if let Err(r) = self.parse_auth_area(cc, &mut reader) {
                return Ok(r);
            }
            let _index_auth = reader.take_tpm2b().unwrap();
            let public = reader.take_tpm2b().unwrap();
            let mut inner = WireReader::new(&public);
            let index = inner.take_u32().unwrap();
            let _name_alg = inner.take_u16().unwrap();
            let attributes = inner.take_u32().unwrap();
            let _policy = inner.take_tpm2b().unwrap();
            let data_size = inner.take_u16().unwrap();
            self.nv.insert(
                index,
                NvSpace {
                    data_size,
                    attributes,
                    data: Vec::new(),
                },
            );
            ok_sessions(&[], &[])
        } else if cc == TpmCc::NvUndefineSpace.to_u32() {
            let _auth_handle = reader.take_u32().unwrap();
            let index = reader.take_u32().unwrap();
            if let Err(r) = self.parse_auth_area(cc, &mut reader) {
                return Ok(r);
            }
            if self.nv.remove(&index).is_none() {
                return Ok(fail(RC_HANDLE));
            }
            ok_sessions(&[], &[])
        } else if cc == TpmCc::NvReadPublic.to_u32() {
            let index = reader.take_u32().unwrap();
            let Some(space) = self.nv.get(&index) else {
                return Ok(fail(RC_HANDLE));
            };
            let mut public = WireBuf::new();
            public.put_u32(index);
            public.put_u16(0x000B);
            public.put_u32(space.attributes);
            public.put_tpm2b_empty();
            public.put_u16(space.data_size);

            let mut params = WireBuf::new();
            params.put_tpm2b(public.as_slice());
            params.put_tpm2b(&[0xAB; 34]); // name
            ok_no_sessions(params.as_slice())
        } else if cc == TpmCc::NvWrite.to_u32() {
            let _auth_handle = reader.take_u32().unwrap();
            let index = reader.take_u32().unwrap();
            if let Err(r) = self.parse_auth_area(cc, &mut reader) {
                return Ok(r);
            }
            let data = reader.take_tpm2b().unwrap();
            let _offset = reader.take_u16().unwrap();
            let Some(space) = self.nv.get_mut(&index) else {
                return Ok(fail(RC_HANDLE));
            };
            if data.len() > space.data_size as usize {
                return Ok(fail(RC_NV_RANGE));
            }
            space.data = data;
            ok_sessions(&[], &[])
        } else if cc == TpmCc::NvRead.to_u32() {
            let _auth_handle = reader.take_u32().unwrap();
            let index = reader.take_u32().unwrap();
            if let Err(r) = self.parse_auth_area(cc, &mut reader) {
                return Ok(r);
            }
            let size = reader.take_u16().unwrap() as usize;
            let _offset = reader.take_u16().unwrap();
            let Some(space) = self.nv.get(&index) else {
                return Ok(fail(RC_HANDLE));
            };
            let mut data = space.data.clone();
            data.resize(size, 0);

            let mut params = WireBuf::new();
            params.put_tpm2b(&data);
            ok_sessions(&[], params.as_slice())
        } else if cc == TpmCc::CreatePrimary.to_u32() {
            let _hierarchy = reader.take_u32().unwrap();
            if let Err(r) = self.parse_auth_area(cc, &mut reader) {
                return Ok(r);
            }
            let handle = 0x8000_0000 + self.next_object;
            self.next_object += 1;
            self.objects.insert(handle);

            let mut params = WireBuf::new();
            params.put_tpm2b(&[0x11; 60]); // outPublic
            ok_sessions(&[handle], params.as_slice())
        } else if cc == TpmCc::Create.to_u32() {
            let _parent = reader.take_u32().unwrap();
            if let Err(r) = self.parse_auth_area(cc, &mut reader) {
                return Ok(r);
            }
            let mut params = WireBuf::new();
            params.put_tpm2b(&[0x22; 40]); // outPrivate
            params.put_tpm2b(&[0x33; 60]); // outPublic
            ok_sessions(&[], params.as_slice())
        } else if cc == TpmCc::Load.to_u32() {
            let _parent = reader.take_u32().unwrap();
            if let Err(r) = self.parse_auth_area(cc, &mut reader) {
                return Ok(r);
            }
            let handle = 0x8000_0000 + self.next_object;
            self.next_object += 1;
            self.objects.insert(handle);

            let mut params = WireBuf::new();
            params.put_tpm2b(&[0xAB; 34]); // name
            ok_sessions(&[handle], params.as_slice())
        } else if cc == TpmCc::ReadPublic.to_u32() {
            let handle = reader.take_u32().unwrap();
            if !self.objects.contains(&handle) {
                return Ok(fail(RC_HANDLE));
            }
            let mut params = WireBuf::new();
            params.put_tpm2b(&[0x11; 60]);
            ok_no_sessions(params.as_slice())
        } else if cc == TpmCc::EvictControl.to_u32() {
            let _auth = reader.take_u32().unwrap();
            let object = reader.take_u32().unwrap();
            if let Err(r) = self.parse_auth_area(cc, &mut reader) {
                return Ok(r);
            }
            let persistent = reader.take_u32().unwrap();
            if object == persistent {
                self.objects.remove(&persistent);
            } else {
                self.objects.insert(persistent);
            }
            ok_sessions(&[], &[])
        } else if cc == TpmCc::PcrExtend.to_u32() {
            let index = reader.take_u32().unwrap();
            if let Err(r) = self.parse_auth_area(cc, &mut reader) {
                return Ok(r);
            }
            let _count = reader.take_u32().unwrap();
            let _alg = reader.take_u16().unwrap();
            let digest = reader.take_rest();
            self.pcrs.insert(index, digest);
            ok_sessions(&[], &[])
        } else if cc == TpmCc::PcrRead.to_u32() {
            let _count = reader.take_u32().unwrap();
            let alg = reader.take_u16().unwrap();
            let select_size = reader.take_u8().unwrap() as usize;
            let bitmap = reader.take_bytes(select_size).unwrap();
            let mut index = 0u32;
            'scan: for (byte, bits) in bitmap.iter().enumerate() {
                for bit in 0..8usize {
                    if bits & (1u8 << bit) != 0 {
                        index = (byte * 8 + bit) as u32;
                        break 'scan;
                    }
                }
            }
            let digest = self.pcrs.get(&index).cloned().unwrap_or_else(|| vec![0; 32]);

            let mut params = WireBuf::new();
            params.put_u32(1); // pcrUpdateCounter
            params.put_u32(1);
            params.put_u16(alg);
            params.put_u8(select_size as u8);
            params.put_bytes(&bitmap);
            params.put_u32(1); // TPML_DIGEST count
            params.put_tpm2b(&digest);
            ok_no_sessions(params.as_slice())
        } else if cc == TpmCc::Quote.to_u32() {
            let _key = reader.take_u32().unwrap();
            if let Err(r) = self.parse_auth_area(cc, &mut reader) {
                return Ok(r);
            }
            let mut nonce = reader.take_tpm2b().unwrap();
            if self.tamper_quote_nonce {
                nonce.push(0xEE);
            }

            let mut attest = WireBuf::new();
            attest.put_u32(0xFF54_4347);
            attest.put_u16(0x8018);
            attest.put_tpm2b(&[0x44; 4]); // qualifiedSigner
            attest.put_tpm2b(&nonce); // extraData
            attest.put_bytes(&[0x00; 25]); // clock info and firmware version

            let mut params = WireBuf::new();
            params.put_tpm2b(attest.as_slice());
            params.put_u16(0x0014); // TPM_ALG_RSASSA
            params.put_u16(0x000B);
            params.put_tpm2b(&[0x5A; 32]);
            ok_sessions(&[], params.as_slice())
        } else {
            fail(RC_INITIALIZE)
        };

        Ok(response)
    }

    fn power_cycle(&mut self) -> tpm2_ops::Result<()> {
        self.power_cycles += 1;
        Ok(())
    }
}

fn ctx(fake: FakeTpm) -> TpmContext<FakeTpm> {
    TpmContext::with_transport(fake)
}

#[test]
fn random_loops_until_requested_length() {
    let mut tpm = ctx(FakeTpm::new());
    let random = tpm.get_random(100).unwrap();

    assert_eq!(random.len(), 100);
    // 32-byte chunks: the last call's bytes identify the chunk boundaries
    assert_eq!(random[0], 1);
    assert_eq!(random[99], 4);

    let fake = tpm.into_transport();
    assert_eq!(fake.random_calls, 4);
    assert_eq!(fake.sessions_started, 1);
    assert_eq!(fake.flush_calls, 1);
    assert!(fake.sessions.is_empty(), "session leaked");
}

#[test]
fn random_request_beyond_u16_range_keeps_looping() {
    // a shortfall of exactly 65536 must not collapse into a zero-byte request
    let mut tpm = ctx(FakeTpm::new());
    let random = tpm.get_random(65536).unwrap();

    assert_eq!(random.len(), 65536);
    let fake = tpm.into_transport();
    assert_eq!(fake.random_calls, 65536 / 32);
    assert!(fake.sessions.is_empty());
}

#[test]
fn random_uses_response_encryption() {
    let mut tpm = ctx(FakeTpm::new());
    tpm.get_random(8).unwrap();

    let fake = tpm.into_transport();
    let (_, handle, attrs) = fake
        .auth_log
        .iter()
        .find(|(cc, _, _)| *cc == TpmCc::GetRandom.to_u32())
        .copied()
        .unwrap();
    assert_ne!(handle, tpm_rh::PW);
    assert_eq!(attrs, 0x41); // encrypt | continueSession
}

#[test]
fn random_failure_still_flushes_session() {
    let mut tpm = ctx(FakeTpm::new().fail_command(TpmCc::GetRandom, 0x100));
    let err = tpm.get_random(16).unwrap_err();
    assert_eq!(err.response_code(), Some(0x100));

    let fake = tpm.into_transport();
    assert_eq!(fake.sessions_started, 1);
    assert_eq!(fake.flush_calls, 1);
    assert!(fake.sessions.is_empty());
}

#[test]
fn random_empty_chunk_is_protocol_error() {
    let mut fake = FakeTpm::new();
    fake.empty_random = true;
    let mut tpm = ctx(fake);

    let err = tpm.get_random(16).unwrap_err();
    assert!(matches!(err, TpmError::Protocol(_)));
    assert!(tpm.into_transport().sessions.is_empty());
}

#[test]
fn operation_error_wins_over_flush_error() {
    let mut tpm = ctx(
        FakeTpm::new()
            .fail_command(TpmCc::GetRandom, 0x100)
            .fail_command(TpmCc::FlushContext, RC_HANDLE),
    );
    let err = tpm.get_random(16).unwrap_err();
    assert_eq!(err.response_code(), Some(0x100));
}

#[test]
fn flush_error_after_success_surfaces() {
    let mut tpm = ctx(FakeTpm::new().fail_command(TpmCc::FlushContext, RC_HANDLE));
    let err = tpm.get_random(16).unwrap_err();
    assert_eq!(err.response_code(), Some(RC_HANDLE));
}

#[test]
fn nv_define_write_read_round_trip() {
    let mut tpm = ctx(FakeTpm::new());
    let index = 0x01c0_000a;
    let secret = [0x42u8; 32];

    tpm.nv_define(Hierarchy::Owner, index, 32, None, Some("nvpw"))
        .unwrap();
    tpm.nv_write(index, Some("nvpw"), &secret).unwrap();
    let read_back = tpm.nv_read(index, Some("nvpw")).unwrap();
    assert_eq!(read_back, secret);

    let fake = tpm.into_transport();
    // define, write and read each run under their own session
    assert_eq!(fake.sessions_started, 3);
    assert_eq!(fake.flush_calls, 3);
    assert!(fake.sessions.is_empty());

    // define/write push parameters encrypted, read pulls them encrypted
    let attrs_for = |cc: TpmCc| {
        fake.auth_log
            .iter()
            .find(|(c, _, _)| *c == cc.to_u32())
            .map(|(_, _, attrs)| *attrs)
            .unwrap()
    };
    assert_eq!(attrs_for(TpmCc::NvDefineSpace), 0x21);
    assert_eq!(attrs_for(TpmCc::NvWrite), 0x21);
    assert_eq!(attrs_for(TpmCc::NvRead), 0x41);
}

#[test]
fn nv_write_beyond_buffer_max_rejected_before_device() {
    let mut fake = FakeTpm::new();
    fake.nv_buffer_max = 16;
    let mut tpm = ctx(fake);
    let index = 0x01c0_000a;

    tpm.nv_define(Hierarchy::Owner, index, 64, None, None).unwrap();
    let err = tpm.nv_write(index, None, &[0u8; 17]).unwrap_err();
    assert!(matches!(
        err,
        TpmError::CapacityExceeded { len: 17, max: 16 }
    ));

    let fake = tpm.into_transport();
    assert_eq!(fake.count(TpmCc::NvWrite), 0, "oversize write reached the device");
    assert!(fake.sessions.is_empty());
}

#[test]
fn nv_read_of_oversized_index_rejected_before_device() {
    let mut fake = FakeTpm::new();
    fake.nv_buffer_max = 16;
    let mut tpm = ctx(fake);
    let index = 0x01c0_000a;

    tpm.nv_define(Hierarchy::Owner, index, 32, None, None).unwrap();
    let err = tpm.nv_read(index, None).unwrap_err();
    assert!(matches!(
        err,
        TpmError::CapacityExceeded { len: 32, max: 16 }
    ));
    assert_eq!(tpm.into_transport().count(TpmCc::NvRead), 0);
}

#[test]
fn nv_undefine_removes_index() {
    let mut tpm = ctx(FakeTpm::new());
    let index = 0x01c0_000a;

    tpm.nv_define(Hierarchy::Owner, index, 8, None, None).unwrap();
    tpm.nv_undefine(Hierarchy::Owner, index, None).unwrap();
    assert!(tpm.nv_read_public(index).is_err());
    assert!(tpm.into_transport().sessions.is_empty());
}

#[test]
fn nv_rejects_non_index_handles() {
    let mut tpm = ctx(FakeTpm::new());
    for result in [
        tpm.nv_define(Hierarchy::Owner, 0x8100_0001, 8, None, None),
        tpm.nv_write(0x8100_0001, None, &[1]),
        tpm.nv_read(0x8100_0001, None).map(|_| ()),
        tpm.nv_undefine(Hierarchy::Owner, 0x8100_0001, None),
    ] {
        assert!(matches!(result, Err(TpmError::BadHandle { .. })));
    }
    // nothing reached the device
    assert!(tpm.into_transport().commands.is_empty());
}

#[test]
fn quote_round_trip_verifies_nonce() {
    let mut tpm = ctx(FakeTpm::new());
    let nonce_hex = "77".repeat(20);
    let quote = tpm.quote(0x8000_0000, None, &nonce_hex, 10).unwrap();

    assert!(!quote.signature.is_empty());
    let attest = tpm2_ops::QuoteAttest::from_bytes(&quote.quoted).unwrap();
    assert_eq!(attest.extra_data, [0x77u8; 20]);
}

#[test]
fn quote_accepts_empty_qualifying_data() {
    let mut tpm = ctx(FakeTpm::new());
    let quote = tpm.quote(0x8000_0000, None, "", 10).unwrap();
    let attest = tpm2_ops::QuoteAttest::from_bytes(&quote.quoted).unwrap();
    assert!(attest.extra_data.is_empty());
}

#[test]
fn quote_with_tampered_nonce_fails_verification() {
    let mut fake = FakeTpm::new();
    fake.tamper_quote_nonce = true;
    let mut tpm = ctx(fake);

    let err = tpm
        .quote(0x8000_0000, None, &"77".repeat(20), 10)
        .unwrap_err();
    assert!(matches!(err, TpmError::Verification(_)));
}

#[test]
fn quote_rejects_oversized_pcr_selection() {
    let mut tpm = ctx(FakeTpm::new());
    let err = tpm
        .quote(0x8000_0000, None, &"77".repeat(20), 25)
        .unwrap_err();
    assert!(matches!(
        err,
        TpmError::CapacityExceeded { len: 25, max: 24 }
    ));
    assert_eq!(tpm.into_transport().count(TpmCc::Quote), 0);
}

#[test]
fn quote_rejects_invalid_hex_qualifying_data() {
    let mut tpm = ctx(FakeTpm::new());
    let err = tpm.quote(0x8000_0000, None, "not-hex", 10).unwrap_err();
    assert!(matches!(err, TpmError::Hex(_)));
    assert!(tpm.into_transport().commands.is_empty());
}

#[test]
fn pcr_extend_pads_and_read_returns_digest() {
    let mut tpm = ctx(FakeTpm::new());
    tpm.pcr_extend(TpmAlgId::Sha256, 16, b"event").unwrap();

    let value = tpm.pcr_read(TpmAlgId::Sha256, 16).unwrap();
    assert_eq!(value.digest.len(), 32);
    assert_eq!(&value.digest[..5], b"event");
    assert!(value.digest[5..].iter().all(|&b| b == 0));
}

#[test]
fn pcr_extend_truncates_to_bank_digest_size() {
    let mut tpm = ctx(FakeTpm::new());
    let long_event: Vec<u8> = (0u8..40).collect();
    tpm.pcr_extend(TpmAlgId::Sha256, 16, &long_event).unwrap();

    let value = tpm.pcr_read(TpmAlgId::Sha256, 16).unwrap();
    assert_eq!(value.digest, long_event[..32]);
}

#[test]
fn pcr_extend_rejects_oversized_data() {
    let mut tpm = ctx(FakeTpm::new());
    let err = tpm
        .pcr_extend(TpmAlgId::Sha256, 16, &[0u8; 65])
        .unwrap_err();
    assert!(matches!(
        err,
        TpmError::CapacityExceeded { len: 65, max: 64 }
    ));
    assert!(tpm.into_transport().commands.is_empty());
}

#[test]
fn pcr_extend_rejects_out_of_range_index() {
    let mut tpm = ctx(FakeTpm::new());
    assert!(tpm.pcr_extend(TpmAlgId::Sha256, 24, b"x").is_err());
    assert!(tpm.into_transport().commands.is_empty());
}

#[test]
fn key_lifecycle_primary_create_load_evict() {
    let dir = std::env::temp_dir().join("tpm2-ops-key-lifecycle");
    std::fs::create_dir_all(&dir).unwrap();
    let priv_path = dir.join("key.priv");
    let pub_path = dir.join("key.pub");
    let primary_pub = dir.join("primary.pub");

    let mut tpm = ctx(FakeTpm::new());
    let parent = tpm
        .create_primary(
            Hierarchy::Owner,
            KeyClass::StorageRestricted,
            None,
            None,
            Some(&primary_pub),
        )
        .unwrap();
    assert_eq!(parent >> 24, 0x80);
    assert_eq!(std::fs::read(&primary_pub).unwrap(), vec![0x11; 60]);

    let created = tpm
        .create_key(
            parent,
            KeyClass::SigningUnrestricted,
            TpmaObject::new(),
            None,
            Some("childpw"),
            Some(&priv_path),
            Some(&pub_path),
        )
        .unwrap();
    assert_eq!(created.private, vec![0x22; 40]);
    assert_eq!(created.public, vec![0x33; 60]);

    let key = tpm.load_key(parent, None, &priv_path, &pub_path).unwrap();
    assert_ne!(key, parent);

    tpm.evict(Hierarchy::Owner, None, key, 0x8100_0001).unwrap();
    tpm.flush_handle(key).unwrap();
    tpm.flush_handle(parent).unwrap();

    let fake = tpm.into_transport();
    assert!(fake.objects.contains(&0x8100_0001));
    assert_eq!(fake.count(TpmCc::CreatePrimary), 1);
    assert_eq!(fake.count(TpmCc::Create), 1);
    assert_eq!(fake.count(TpmCc::Load), 1);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn evict_rejects_non_persistent_target() {
    let mut tpm = ctx(FakeTpm::new());
    let err = tpm
        .evict(Hierarchy::Owner, None, 0x8000_0000, 0x0100_0001)
        .unwrap_err();
    assert!(matches!(
        err,
        TpmError::BadHandle {
            handle: 0x0100_0001,
            ..
        }
    ));
    assert!(tpm.into_transport().commands.is_empty());
}

#[test]
fn initialization_sequence() {
    let mut tpm = ctx(FakeTpm::new());
    tpm.power_cycle().unwrap();
    tpm.startup(StartupKind::Clear).unwrap();
    tpm.self_test().unwrap();
    tpm.clear(Some("lockoutpw")).unwrap();

    let fake = tpm.into_transport();
    assert_eq!(fake.power_cycles, 1);
    assert_eq!(
        fake.commands,
        vec![
            TpmCc::Startup.to_u32(),
            TpmCc::SelfTest.to_u32(),
            TpmCc::Clear.to_u32()
        ]
    );
}

#[test]
fn capability_query_failure_falls_back() {
    let mut tpm = ctx(FakeTpm::new().fail_command(TpmCc::GetCapability, 0x100));
    assert_eq!(tpm.max_nv_buffer_size(), 512);
}

#[test]
fn capability_query_returns_device_value() {
    let mut fake = FakeTpm::new();
    fake.nv_buffer_max = 2048;
    let mut tpm = ctx(fake);
    assert_eq!(tpm.max_nv_buffer_size(), 2048);
}
