#![no_main]
use libfuzzer_sys::fuzz_target;
use pixie_core::attestation::{verify_attestation, AttestationRecord};

fuzz_target!(|data: &[u8]| {
    let Ok(record) = AttestationRecord::from_bytes(data) else { return; };
    assert_eq!(&record.to_bytes()[..], data);
    let _ = verify_attestation(&record);
});
