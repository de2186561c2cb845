use pixie_core::attestation::{attestation_payload, pkcs1_sha256_block, RECORD_WIRE_LEN};
use pixie_core::crypto::{keccak256, sha256};
use pixie_core::derivation::{entropy_from_signature, key_from_entropy};
use pixie_core::oracle::{KeySlot, OracleError, WrappedKey, RSA_LEN, WRAPPED_KEY_LEN};
use pixie_core::secure_material::{
    ATTEST_PROOF_BLOB, NAMESPACE, PARTITION_LABEL, PUBLIC_MODULUS_BLOB, WRAPPED_KEY_BLOB,
};
use pixie_core::simulator::{self, Provisioning};
use pixie_core::{
    verify_attestation, AttestationRecord, Device, DeviceError, FuseImage, InitStatus,
    MemoryPartition, PixieConfig, SigningOracle,
};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const FIXTURE_KEY: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/attest_rsa3072.pem");

/// Deterministic stand-in for the peripheral: returns the operand after an
/// optional delay, counting calls.
#[derive(Default)]
struct CountingOracle {
    calls: AtomicU64,
    delay: Duration,
}

impl SigningOracle for CountingOracle {
    fn sign(
        &self,
        block: &[u8; RSA_LEN],
        _wrapped: &WrappedKey,
        _slot: KeySlot,
    ) -> Result<[u8; RSA_LEN], OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        Ok(*block)
    }
}

fn stub_partition(wrapped: &[u8]) -> MemoryPartition {
    MemoryPartition::new(PARTITION_LABEL)
        .with_blob(NAMESPACE, WRAPPED_KEY_BLOB, wrapped)
        .with_blob(NAMESPACE, ATTEST_PROOF_BLOB, &[0x11; 64])
        .with_blob(NAMESPACE, PUBLIC_MODULUS_BLOB, &[0x22; RSA_LEN])
}

fn stub_device(oracle: Arc<CountingOracle>) -> Device {
    let device = Device::new(
        Box::new(FuseImage::with_identity(1, 0x0101, 42)),
        Box::new(stub_partition(&[0u8; WRAPPED_KEY_LEN])),
        oracle,
    );
    assert_eq!(device.initialize(), InitStatus::Ok);
    device
}

fn provisioned(dir: &Path) -> PixieConfig {
    let config = PixieConfig::default_with_dir(dir);
    let rsa_key = simulator::load_rsa_key(Path::new(FIXTURE_KEY)).expect("fixture key");
    simulator::provision(
        &config,
        &Provisioning {
            model_number: 0x0101,
            serial_number: 42,
            rsa_key: &rsa_key,
            attest_proof: [0x5a; 64],
        },
    )
    .expect("provision");
    config
}

// =============================================================================
// Deterministic Pipeline
// =============================================================================

#[test]
fn test_zero_blob_key_is_recomputable() {
    let device = stub_device(Arc::new(CountingOracle::default()));
    let key = device.derive_test_key(0).expect("derive");

    // Recompute every stage by hand. The stub returns its operand, so the
    // "signature" is the PKCS#1 block itself.
    let digest = keccak256(&[0u8; WRAPPED_KEY_LEN]);
    let mut internal_nonce = [0u8; 16];
    internal_nonce[0] = 0x80;
    let block = pkcs1_sha256_block(&sha256(&attestation_payload(&internal_nonce, &digest)));
    let entropy = entropy_from_signature(&block);
    let expected = key_from_entropy(&entropy, 0).expect("expected key");

    assert_eq!(key, expected);
    assert_eq!(key.path().to_string(), "m/44'/60'/0'/0/0");

    // A fresh device over the same material yields the same key.
    let again = stub_device(Arc::new(CountingOracle::default()));
    assert_eq!(again.derive_test_key(0).unwrap(), key);
}

#[test]
fn test_concurrent_account_zero_signs_once() {
    let oracle = Arc::new(CountingOracle {
        calls: AtomicU64::new(0),
        delay: Duration::from_millis(50),
    });
    let device = stub_device(oracle.clone());

    let keys: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| device.derive_test_key(0).expect("derive")))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(keys.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_other_accounts_are_not_cached() {
    let oracle = Arc::new(CountingOracle::default());
    let device = stub_device(oracle.clone());

    let a = device.derive_test_key(7).unwrap();
    let b = device.derive_test_key(7).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.account(), 7);
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_reserved_account_bit() {
    let oracle = Arc::new(CountingOracle::default());
    let device = stub_device(oracle.clone());

    assert!(matches!(
        device.derive_test_key(0x8000_0000),
        Err(DeviceError::InvalidAccount(0x8000_0000))
    ));
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_wrong_size_blob_fails_initialization() {
    let partition = Arc::new(stub_partition(&[0u8; WRAPPED_KEY_LEN - 1]));
    let device = Device::new(
        Box::new(FuseImage::with_identity(1, 0x0101, 42)),
        Box::new(partition.clone()),
        Arc::new(CountingOracle::default()),
    );

    assert_eq!(device.initialize(), InitStatus::MissingSecureMaterial);
    assert_eq!(device.initialize(), InitStatus::MissingSecureMaterial);
    assert_eq!(partition.opens(), 1);
    assert!(!device.can_attest());
}

// =============================================================================
// Simulated Device
// =============================================================================

#[test]
fn test_simulated_attestation_verifies() {
    let dir = TempDir::new().unwrap();
    let config = provisioned(dir.path());
    let device = simulator::open_device(&config).expect("open");
    assert_eq!(device.initialize(), InitStatus::Ok);

    let record = device.attest(&[0x42; 32]).expect("attest");
    assert_eq!(record.model_number, 0x0101);
    assert_eq!(record.serial_number, 42);
    assert_eq!(record.attest_proof, [0x5a; 64]);
    assert_eq!(record.nonce[0] & 0x80, 0);
    verify_attestation(&record).expect("verify");

    let mut tampered = record.clone();
    tampered.challenge[0] ^= 1;
    assert!(verify_attestation(&tampered).is_err());

    let mut tampered = record.clone();
    tampered.nonce[15] ^= 0x80;
    assert!(verify_attestation(&tampered).is_err());

    let mut tampered = record.clone();
    tampered.signature[RSA_LEN - 1] ^= 1;
    assert!(verify_attestation(&tampered).is_err());

    let wire = record.to_bytes();
    assert_eq!(wire.len(), RECORD_WIRE_LEN);
    let parsed = AttestationRecord::from_bytes(&wire).expect("parse");
    assert_eq!(parsed, record);
    verify_attestation(&parsed).expect("verify parsed");
}

#[test]
fn test_simulated_challenges_differ() {
    let dir = TempDir::new().unwrap();
    let config = provisioned(dir.path());
    let device = simulator::open_device(&config).expect("open");
    device.initialize();

    let a = device.attest(&[1; 32]).unwrap();
    let b = device.attest(&[2; 32]).unwrap();
    assert_ne!(a.nonce, b.nonce);
    assert_ne!(a.signature, b.signature);
    assert_eq!(a.rsa_modulus, b.rsa_modulus);
    assert_eq!(a.attest_proof, b.attest_proof);
    assert_eq!(
        (a.model_number, a.serial_number),
        (b.model_number, b.serial_number)
    );
}

#[test]
fn test_simulated_test_key_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let config = provisioned(dir.path());

    let first = simulator::open_device(&config).unwrap();
    first.initialize();
    let key = first.derive_test_key(0).unwrap();

    let second = simulator::open_device(&config).unwrap();
    second.initialize();
    assert_eq!(second.derive_test_key(0).unwrap(), key);

    let address = key.checksum_address().unwrap();
    assert!(address.starts_with("0x"));
    assert_eq!(address.len(), 42);
}
