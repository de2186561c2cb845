use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use pixie_core::attestation::{AttestationRecord, CHALLENGE_LEN, RECORD_WIRE_LEN};
use pixie_core::secure_material::ATTEST_PROOF_LEN;
use pixie_core::simulator::{self, Provisioning};
use pixie_core::{verify_attestation, Device, InitStatus, PixieConfig};
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about = "Firefly Pixie device identity and attestation tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a simulated device into the data directory
    Init {
        /// Model number (decimal or 0x-prefixed hex)
        #[arg(long, value_parser = parse_u32)]
        model: u32,
        /// Serial number (decimal or 0x-prefixed hex)
        #[arg(long, value_parser = parse_u32)]
        serial: u32,
        /// RSA-3072 attestation key, PKCS#1 or PKCS#8 PEM
        #[arg(long)]
        rsa_key: PathBuf,
        /// Manufacturer attestation proof (64 bytes hex, default all zero)
        #[arg(long)]
        proof: Option<String>,
    },
    /// Show initialization status and device identity
    Status,
    /// Produce an attestation record for a challenge
    Attest {
        /// 32-byte challenge in hex (default: random)
        #[arg(short, long)]
        challenge: Option<String>,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Verify the signature of an attestation record (JSON or wire form)
    Verify {
        /// Path to the record
        file: PathBuf,
    },
    /// Show the address of a deterministic test key
    TestKey {
        /// BIP-44 account index
        #[arg(short, long, default_value_t = 0)]
        account: u32,
    },
}

/// Get the pixie data directory
fn pixie_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("PIXIE_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().ok_or_else(|| anyhow!("Could not determine home directory"))?;
    Ok(home.join(".pixie"))
}

fn load_config() -> Result<PixieConfig> {
    let dir = pixie_dir()?;
    log::debug!("using data directory {:?}", dir);
    PixieConfig::load_or_default(&dir)
}

fn parse_u32(value: &str) -> Result<u32, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid number {:?}: {}", value, e))
}

fn parse_hex_array<const N: usize>(value: &str, what: &str) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    hex::decode_to_slice(value.trim().trim_start_matches("0x"), &mut out)
        .with_context(|| format!("{} must be {} bytes of hex", what, N))?;
    Ok(out)
}

/// Open the simulated device and run initialization.
fn open_ready_device() -> Result<Device> {
    let config = load_config()?;
    let device = simulator::open_device(&config)?;
    let status = device.initialize();
    if !status.is_ok() {
        return Err(anyhow!(
            "Device not ready: {} ({}). Run 'pixie init' first.",
            status,
            status.code()
        ));
    }
    Ok(device)
}

// =============================================================================
// Command Implementations
// =============================================================================

fn cmd_init(model: u32, serial: u32, rsa_key: &Path, proof: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let rsa_key = simulator::load_rsa_key(rsa_key)?;
    let attest_proof = match proof {
        Some(proof) => parse_hex_array::<ATTEST_PROOF_LEN>(proof, "Proof")?,
        None => [0u8; ATTEST_PROOF_LEN],
    };

    simulator::provision(
        &config,
        &Provisioning {
            model_number: model,
            serial_number: serial,
            rsa_key: &rsa_key,
            attest_proof,
        },
    )?;

    println!("Simulated device initialized successfully");
    println!("  Data directory: {:?}", config.data_dir);
    println!("  Fuse image:     {:?}", config.fuse_image_path());
    println!("  Partition:      {:?}", config.partition_path());
    Ok(())
}

fn cmd_status() -> Result<()> {
    let config = load_config()?;
    let device = simulator::open_device(&config)?;
    let status = device.initialize();

    println!("=== Pixie Status ===");
    println!();
    println!("Data directory: {:?}", config.data_dir);
    println!("Status: {} ({})", status, status.code());
    println!("Model: {}", device.model_name());
    match (device.model_number(), device.serial_number()) {
        (Some(model), Some(serial)) => {
            println!("Model number: {:#06x}", model);
            println!("Serial number: {}", serial);
        }
        _ => println!("Identity: unavailable"),
    }
    println!(
        "Attestation: {}",
        if device.can_attest() { "available" } else { "unavailable" }
    );
    if status == InitStatus::MissingFuseData {
        println!();
        println!("Run 'pixie init' to create a simulated device.");
    }
    Ok(())
}

fn cmd_attest(challenge: Option<&str>, output: Option<&Path>) -> Result<()> {
    let challenge: [u8; CHALLENGE_LEN] = match challenge {
        Some(challenge) => parse_hex_array(challenge, "Challenge")?,
        None => {
            let mut challenge = [0u8; CHALLENGE_LEN];
            rand::rng().fill(&mut challenge);
            challenge
        }
    };

    let device = open_ready_device()?;
    let record = device.attest(&challenge).context("Attestation failed")?;
    let json = serde_json::to_string_pretty(&record)?;

    match output {
        Some(path) => {
            fs::write(path, &json)
                .with_context(|| format!("Failed to write record: {:?}", path))?;
            println!("Attestation record written to {:?}", path);
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn read_record(path: &Path) -> Result<AttestationRecord> {
    let raw = fs::read(path).with_context(|| format!("Failed to read record: {:?}", path))?;
    if raw.len() == RECORD_WIRE_LEN {
        return AttestationRecord::from_bytes(&raw).context("Invalid wire record");
    }
    serde_json::from_slice(&raw).with_context(|| format!("Failed to parse record: {:?}", path))
}

fn cmd_verify(file: &Path) -> Result<()> {
    let record = read_record(file)?;
    verify_attestation(&record).context("Signature: INVALID")?;

    println!("Signature: VALID");
    println!("  Model number:  {:#06x}", record.model_number);
    println!("  Serial number: {}", record.serial_number);
    println!("  Challenge:     {}", hex::encode(record.challenge));
    println!("  Nonce:         {}", hex::encode(record.nonce));
    println!("  Modulus:       {}...", hex::encode(&record.rsa_modulus[..8]));
    Ok(())
}

fn cmd_test_key(account: u32) -> Result<()> {
    let device = open_ready_device()?;
    let key = device
        .derive_test_key(account)
        .with_context(|| format!("Failed to derive test key for account {}", account))?;

    println!("Path: {}", key.path());
    println!("Address: {}", key.checksum_address()?);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            model,
            serial,
            rsa_key,
            proof,
        } => {
            cmd_init(model, serial, &rsa_key, proof.as_deref())?;
        }
        Commands::Status => {
            cmd_status()?;
        }
        Commands::Attest { challenge, output } => {
            cmd_attest(challenge.as_deref(), output.as_deref())?;
        }
        Commands::Verify { file } => {
            cmd_verify(&file)?;
        }
        Commands::TestKey { account } => {
            cmd_test_key(account)?;
        }
    }

    Ok(())
}
