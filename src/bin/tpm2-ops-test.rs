// SPDX-FileCopyrightText: © 2026 The tpm2-ops Authors
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 orchestration test CLI
//!
//! A simple CLI tool to exercise the orchestration layer on real hardware.
//!
//! Usage:
//!   tpm2-ops-test [command]
//!
//! Commands:
//!   info        - Show TPM device info
//!   random      - Generate random bytes
//!   pcr-read    - Read PCR values
//!   pcr-extend  - Test PCR extend
//!   primary     - Test primary key creation
//!   key         - Test child key create/load round trip
//!   evict       - Test EvictControl (persistent key)
//!   nv-full     - Full NV test (define/write/read/undefine)
//!   quote       - Generate and verify a quote with a fresh signing key
//!   all         - Run all tests

use std::env;

use tpm2_ops::{Hierarchy, KeyClass, TpmAlgId, TpmContext, TpmaObject};

fn main() {
    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("all");

    println!("=== TPM 2.0 Orchestration Test Tool ===\n");

    match command {
        "info" => test_info(),
        "random" => test_random(),
        "pcr-read" => test_pcr_read(),
        "pcr-extend" => test_pcr_extend(),
        "primary" => test_primary_key(),
        "key" => test_child_key(),
        "evict" => test_evict_control(),
        "nv-full" => test_nv_full(),
        "quote" => test_quote(),
        "all" => {
            test_info();
            test_random();
            test_pcr_read();
            test_primary_key();
            test_child_key();
            test_nv_full();
            test_quote();
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("Available commands: info, random, pcr-read, pcr-extend, primary, key, evict, nv-full, quote, all");
            std::process::exit(1);
        }
    }
}

fn open_context() -> Option<TpmContext<tpm2_ops::TpmDevice>> {
    match TpmContext::open(None) {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            println!("✗ Failed to open TPM: {}", e);
            None
        }
    }
}

fn test_info() {
    println!("--- Test: Device Info ---");

    match TpmContext::open(None) {
        Ok(ctx) => {
            println!("✓ TPM device opened: {}", ctx.device_path());
        }
        Err(e) => {
            println!("✗ Failed to open TPM device: {}", e);
        }
    }
    println!();
}

fn test_random() {
    println!("--- Test: Random Number Generation ---");

    let Some(mut ctx) = open_context() else {
        return;
    };

    match ctx.get_random(32) {
        Ok(bytes) => {
            println!("✓ Generated 32 random bytes:");
            println!("  {}", hex::encode(&bytes));
        }
        Err(e) => {
            println!("✗ GetRandom failed: {}", e);
        }
    }

    // larger than one GetRandom response, exercises the chunk loop
    match ctx.get_random(100) {
        Ok(bytes) => {
            println!("✓ Generated 100 random bytes:");
            println!("  {}...", &hex::encode(&bytes)[..64]);
        }
        Err(e) => {
            println!("✗ GetRandom (100 bytes) failed: {}", e);
        }
    }
    println!();
}

fn test_pcr_read() {
    println!("--- Test: PCR Read ---");

    let Some(mut ctx) = open_context() else {
        return;
    };

    for index in [0, 1, 2, 7] {
        match ctx.pcr_read(TpmAlgId::Sha256, index) {
            Ok(value) => {
                println!("  PCR[{}] = {}", index, value.digest_hex());
            }
            Err(e) => {
                println!("✗ PCR_Read({}) failed: {}", index, e);
            }
        }
    }
    println!();
}

fn test_pcr_extend() {
    println!("--- Test: PCR Extend ---");
    println!("  Note: This test extends PCR 23 which is typically resettable");

    let Some(mut ctx) = open_context() else {
        return;
    };

    let before = match ctx.pcr_read(TpmAlgId::Sha256, 23) {
        Ok(value) => {
            println!("  PCR[23] before: {}", value.digest_hex());
            value
        }
        Err(e) => {
            println!("✗ PCR_Read failed: {}", e);
            return;
        }
    };

    // short input, zero-padded to the digest size by the layer
    match ctx.pcr_extend(TpmAlgId::Sha256, 23, b"test event") {
        Ok(()) => println!("✓ PCR_Extend succeeded"),
        Err(e) => {
            println!("✗ PCR_Extend failed: {}", e);
            return;
        }
    }

    match ctx.pcr_read(TpmAlgId::Sha256, 23) {
        Ok(value) => {
            println!("  PCR[23] after:  {}", value.digest_hex());
            if value.digest != before.digest {
                println!("✓ PCR value changed as expected");
            } else {
                println!("✗ PCR value did not change!");
            }
        }
        Err(e) => {
            println!("✗ PCR_Read after extend failed: {}", e);
        }
    }
    println!();
}

fn test_primary_key() {
    println!("--- Test: Primary Key ---");

    let Some(mut ctx) = open_context() else {
        return;
    };

    println!("  Creating transient primary key under Owner hierarchy...");
    match ctx.create_primary(Hierarchy::Owner, KeyClass::StorageRestricted, None, None, None) {
        Ok(handle) => {
            println!("✓ Created primary key:");
            println!("  Handle: 0x{:08x}", handle);

            match ctx.read_public(handle) {
                Ok(public) => println!("  Public size: {} bytes", public.len()),
                Err(e) => println!("✗ ReadPublic failed: {}", e),
            }

            if let Err(e) = ctx.flush_handle(handle) {
                println!("  Warning: Failed to flush handle: {}", e);
            } else {
                println!("  Flushed transient handle");
            }
        }
        Err(e) => {
            println!("✗ CreatePrimary failed: {}", e);
        }
    }
    println!();
}

fn test_child_key() {
    println!("--- Test: Child Key Create/Load ---");

    let Some(mut ctx) = open_context() else {
        return;
    };

    let parent = match ctx.create_primary(
        Hierarchy::Owner,
        KeyClass::StorageRestricted,
        None,
        None,
        None,
    ) {
        Ok(handle) => {
            println!("✓ Created parent key: 0x{:08x}", handle);
            handle
        }
        Err(e) => {
            println!("✗ CreatePrimary failed: {}", e);
            return;
        }
    };

    let dir = env::temp_dir();
    let priv_path = dir.join("tpm2-ops-test.priv");
    let pub_path = dir.join("tpm2-ops-test.pub");

    match ctx.create_key(
        parent,
        KeyClass::SigningUnrestricted,
        TpmaObject::new(),
        None,
        Some("childpw"),
        Some(&priv_path),
        Some(&pub_path),
    ) {
        Ok(key) => {
            println!("✓ Created child key:");
            println!("  Private blob: {} bytes", key.private.len());
            println!("  Public blob:  {} bytes", key.public.len());
        }
        Err(e) => {
            println!("✗ Create failed: {}", e);
            let _ = ctx.flush_handle(parent);
            return;
        }
    }

    match ctx.load_key(parent, None, &priv_path, &pub_path) {
        Ok(handle) => {
            println!("✓ Loaded child key: 0x{:08x}", handle);
            let _ = ctx.flush_handle(handle);
        }
        Err(e) => {
            println!("✗ Load failed: {}", e);
        }
    }

    let _ = std::fs::remove_file(&priv_path);
    let _ = std::fs::remove_file(&pub_path);
    let _ = ctx.flush_handle(parent);
    println!();
}

fn test_evict_control() {
    println!("--- Test: EvictControl (Persistent Key) ---");
    println!("  Warning: This test creates and removes persistent key at 0x81000200");

    let Some(mut ctx) = open_context() else {
        return;
    };

    let persistent_handle: u32 = 0x81000200;

    // clean up leftovers of a previous failed run
    if ctx.read_public(persistent_handle).is_ok() {
        println!("  Cleaning up existing persistent handle...");
        let _ = ctx.evict(Hierarchy::Owner, None, persistent_handle, persistent_handle);
    }

    let transient = match ctx.create_primary(
        Hierarchy::Owner,
        KeyClass::StorageRestricted,
        None,
        None,
        None,
    ) {
        Ok(handle) => {
            println!("✓ Created transient key: 0x{:08x}", handle);
            handle
        }
        Err(e) => {
            println!("✗ CreatePrimary failed: {}", e);
            return;
        }
    };

    println!("  Making key persistent at 0x{:08x}...", persistent_handle);
    match ctx.evict(Hierarchy::Owner, None, transient, persistent_handle) {
        Ok(()) => println!("✓ EvictControl succeeded - key is now persistent"),
        Err(e) => {
            println!("✗ EvictControl failed: {}", e);
            let _ = ctx.flush_handle(transient);
            return;
        }
    }

    let _ = ctx.flush_handle(transient);

    println!("  Removing persistent key...");
    match ctx.evict(Hierarchy::Owner, None, persistent_handle, persistent_handle) {
        Ok(()) => println!("✓ Persistent key removed"),
        Err(e) => println!("✗ EvictControl (remove) failed: {}", e),
    }

    match ctx.read_public(persistent_handle) {
        Ok(_) => println!("✗ Persistent handle still exists!"),
        Err(_) => println!("✓ Persistent handle successfully removed"),
    }
    println!();
}

fn test_nv_full() {
    println!("--- Test: Full NV Operations (Define/Write/Read/Undefine) ---");
    println!("  Warning: This test creates and deletes NV index 0x01800200");

    let Some(mut ctx) = open_context() else {
        return;
    };

    let test_nv_index: u32 = 0x01800200;
    let test_data = b"Hello TPM NV!";

    // clean up leftovers of a previous failed run
    if ctx.nv_read_public(test_nv_index).is_ok() {
        println!("  Cleaning up existing NV index...");
        let _ = ctx.nv_undefine(Hierarchy::Owner, test_nv_index, None);
    }

    println!(
        "  Defining NV index 0x{:08x} with size {}...",
        test_nv_index,
        test_data.len()
    );
    match ctx.nv_define(
        Hierarchy::Owner,
        test_nv_index,
        test_data.len() as u16,
        None,
        Some("nvpw"),
    ) {
        Ok(()) => println!("✓ NV_DefineSpace succeeded"),
        Err(e) => {
            println!("✗ NV_DefineSpace failed: {}", e);
            return;
        }
    }

    println!("  Writing {} bytes to NV...", test_data.len());
    match ctx.nv_write(test_nv_index, Some("nvpw"), test_data) {
        Ok(()) => println!("✓ NV_Write succeeded"),
        Err(e) => println!("✗ NV_Write failed: {}", e),
    }

    println!("  Reading from NV...");
    match ctx.nv_read(test_nv_index, Some("nvpw")) {
        Ok(data) => {
            println!("✓ NV_Read succeeded: {} bytes", data.len());
            if data == test_data {
                println!("✓ Data matches!");
            } else {
                println!("✗ Data mismatch!");
                println!("  Expected: {:?}", String::from_utf8_lossy(test_data));
                println!("  Got:      {:?}", String::from_utf8_lossy(&data));
            }
        }
        Err(e) => println!("✗ NV_Read failed: {}", e),
    }

    println!("  Undefining NV index...");
    match ctx.nv_undefine(Hierarchy::Owner, test_nv_index, None) {
        Ok(()) => println!("✓ NV_UndefineSpace succeeded"),
        Err(e) => println!("✗ NV_UndefineSpace failed: {}", e),
    }

    match ctx.nv_read_public(test_nv_index) {
        Ok(_) => println!("✗ NV index still exists after undefine!"),
        Err(_) => println!("✓ NV index successfully removed"),
    }
    println!();
}

fn test_quote() {
    println!("--- Test: Quote Generation ---");

    let Some(mut ctx) = open_context() else {
        return;
    };

    // primaries are always storage roots, so the attestation key is a child
    let parent = match ctx.create_primary(
        Hierarchy::Owner,
        KeyClass::StorageRestricted,
        None,
        None,
        None,
    ) {
        Ok(handle) => {
            println!("✓ Created parent key: 0x{:08x}", handle);
            handle
        }
        Err(e) => {
            println!("✗ CreatePrimary failed: {}", e);
            return;
        }
    };

    let dir = env::temp_dir();
    let priv_path = dir.join("tpm2-ops-quote.priv");
    let pub_path = dir.join("tpm2-ops-quote.pub");

    let ak_handle = match ctx
        .create_key(
            parent,
            KeyClass::SigningRestricted,
            TpmaObject::new(),
            None,
            None,
            Some(&priv_path),
            Some(&pub_path),
        )
        .and_then(|_| ctx.load_key(parent, None, &priv_path, &pub_path))
    {
        Ok(handle) => {
            println!("✓ Loaded signing key: 0x{:08x}", handle);
            handle
        }
        Err(e) => {
            println!("✗ Failed to set up signing key: {}", e);
            let _ = ctx.flush_handle(parent);
            return;
        }
    };

    let nonce = match ctx.get_random(20) {
        Ok(bytes) => bytes,
        Err(e) => {
            println!("✗ GetRandom for nonce failed: {}", e);
            let _ = ctx.flush_handle(ak_handle);
            let _ = ctx.flush_handle(parent);
            return;
        }
    };

    match ctx.quote(ak_handle, None, &hex::encode(&nonce), 10) {
        Ok(quote) => {
            println!("✓ Generated and verified quote over PCRs 0..10:");
            println!("  Quoted size: {} bytes", quote.quoted.len());
            println!("  Signature size: {} bytes", quote.signature.len());
            match attest_summary(&quote.quoted) {
                Ok(summary) => println!("  {}", summary),
                Err(e) => println!("✗ Attestation parse failed: {}", e),
            }
        }
        Err(e) => {
            println!("✗ Quote failed: {}", e);
        }
    }

    let _ = std::fs::remove_file(&priv_path);
    let _ = std::fs::remove_file(&pub_path);
    let _ = ctx.flush_handle(ak_handle);
    let _ = ctx.flush_handle(parent);
    println!();
}

/// Decode the clock and signer fields of a quoted TPMS_ATTEST for display.
fn attest_summary(quoted: &[u8]) -> anyhow::Result<String> {
    use tpm2_ops::wire::WireReader;

    let mut reader = WireReader::new(quoted);
    let magic = reader.take_u32()?;
    let attest_type = reader.take_u16()?;
    if magic != 0xFF54_4347 {
        anyhow::bail!("unexpected TPMS_ATTEST.magic: 0x{:08x}", magic);
    }
    if attest_type != 0x8018 {
        anyhow::bail!("unexpected TPMS_ATTEST.type: 0x{:04x}", attest_type);
    }
    let signer = reader.take_tpm2b()?;
    let _extra_data = reader.take_tpm2b()?;

    let clock = (reader.take_u32()? as u64) << 32 | reader.take_u32()? as u64;
    let reset_count = reader.take_u32()?;
    let restart_count = reader.take_u32()?;

    Ok(format!(
        "Signer: {}, clock: {}ms, resets: {}, restarts: {}",
        hex::encode(&signer),
        clock,
        reset_count,
        restart_count
    ))
}
