use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use zkp_anon_signal::{
    config::Config, utils::field_to_hex, CommitmentsFile, GroupRegistry, Halo2Backend,
    LedgerLock, ProofEngine, SignalLedger, SignalProof, VerificationService, CIRCUIT_K, TREE_DEPTH,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Verify and record an anonymous signal",
    long_about = "Verify and record an anonymous signal.\n\nThe ledger file is locked through a `<ledger>.lock` file while the proof is checked and recorded. A second verifier on the same ledger fails instead of waiting. Remove a stale lock file left by a killed verifier by hand."
)]
struct Args {
    #[arg(short, long)]
    proof_file: PathBuf,

    /// Enrolled commitments, in insertion order
    #[arg(short, long)]
    commitments_file: Option<PathBuf>,

    /// Ledger of accepted signals; defaults to `<proof file>.ledger.json`
    #[arg(short, long)]
    ledger_file: Option<PathBuf>,

    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };
    if config.group.depth != TREE_DEPTH {
        return Err(anyhow::anyhow!(
            "Configured group depth {} is not supported by this build (expected {TREE_DEPTH})",
            config.group.depth
        ));
    }

    if !args.proof_file.exists() {
        return Err(anyhow::anyhow!(
            "Proof file does not exist: {}",
            args.proof_file.display()
        ));
    }

    info!("Loading proof from: {}", args.proof_file.display());
    println!("Loading proof from: {}", args.proof_file.display());

    let metadata = fs::metadata(&args.proof_file).context("Failed to read proof file metadata")?;
    debug!("Proof file size: {} bytes", metadata.len());
    if metadata.len() > config.proof.max_file_size {
        return Err(anyhow::anyhow!(
            "Proof file too large: {} bytes (max {} bytes). This may indicate a corrupted or invalid proof file.",
            metadata.len(),
            config.proof.max_file_size
        ));
    }

    let proof_content = fs::read_to_string(&args.proof_file).context("Failed to read proof file")?;
    let proof: SignalProof =
        serde_json::from_str(&proof_content).context("Failed to parse proof JSON")?;

    println!("Proof details:");
    println!("  Scope: {}", proof.scope);
    println!("  Signal: {}", String::from_utf8_lossy(&proof.signal));
    println!("  Root: {}", proof.public_signals.root);
    println!("  Nullifier hash: {}", proof.nullifier_hash());
    println!("  ZK Proof Size: {} bytes", proof.zkp_proof.len());

    let commitments_file = args
        .commitments_file
        .clone()
        .or_else(|| config.group.commitments_file.clone())
        .context("No commitments file given. Pass --commitments-file or set group.commitments_file")?;
    let source = CommitmentsFile::new(&commitments_file).with_max_file_size(config.group.max_file_size);
    let registry = Arc::new(GroupRegistry::from_source(
        config.group.depth,
        config.group.root_history_size,
        &source,
    )?);
    println!("Group root: {}", field_to_hex(registry.root()));

    let ledger_path = args
        .ledger_file
        .clone()
        .or_else(|| config.ledger.path.clone())
        .unwrap_or_else(|| args.proof_file.with_extension("ledger.json"));
    let _ledger_lock = LedgerLock::acquire(&ledger_path)?;
    let ledger = Arc::new(SignalLedger::load(&ledger_path)?);
    debug!("Ledger file: {}", ledger_path.display());

    info!("Preparing verifying keys (k={CIRCUIT_K})");
    println!("Preparing verifying keys...");
    let backend = Halo2Backend::<TREE_DEPTH>::load_or_generate(
        CIRCUIT_K,
        &config.keys.cache_dir,
        config.keys.enable_persistence,
    )?;
    let engine = Arc::new(ProofEngine::new(Arc::new(backend)).with_limits(config.limits()));
    let service = VerificationService::new(registry, engine, Arc::clone(&ledger));

    println!("Verifying ZK proof...");
    match service.submit(&proof) {
        Ok(accepted) => {
            info!("Proof verification PASSED");
            println!("\n✓ Proof verification PASSED!");
            println!("A member of the group sent this signal in scope '{}'.", accepted.scope);
            println!("\nNullifier hash: {}", accepted.nullifier_hash);

            ledger.save(&ledger_path).with_context(|| {
                format!("Failed to record nullifier to: {}", ledger_path.display())
            })?;
            println!("\nNullifier recorded to: {}", ledger_path.display());
            Ok(())
        }
        Err(e) => {
            error!("Proof verification FAILED: {e}");
            println!("\n✗ Proof verification FAILED!");
            println!("Error: {e}");
            if e.is_recoverable() {
                println!("Generate a fresh proof against the current group root and resubmit.");
            }
            Err(anyhow::anyhow!("Proof rejected: {e}"))
        }
    }
}
