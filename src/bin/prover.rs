use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use zkp_anon_signal::{
    config::Config, derive_identity, utils::field_to_hex, CommitmentsFile, GroupRegistry,
    Halo2Backend, Identity, ProofEngine, CIRCUIT_K, TREE_DEPTH,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Prove group membership and sign a scoped signal", long_about = None)]
struct Args {
    /// Enrolled commitments, in insertion order
    #[arg(short, long)]
    commitments_file: Option<PathBuf>,

    /// Identity seed
    #[arg(long, env = "ZKP_IDENTITY_SEED", hide_env_values = true)]
    seed: Option<String>,

    /// Identity exported as secret JSON, used instead of a seed
    #[arg(long, conflicts_with = "seed")]
    identity_file: Option<PathBuf>,

    /// Scope (event or topic) the signal is sent in
    #[arg(short, long)]
    scope: String,

    /// Signal payload
    #[arg(long, default_value = "")]
    signal: String,

    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_identity(args: &Args) -> Result<Identity> {
    if let Some(path) = &args.identity_file {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read identity file: {}", path.display()))?;
        return Identity::from_secret_json(&json);
    }

    let seed = args.seed.as_deref().context(
        "No identity given. Pass --seed (or set ZKP_IDENTITY_SEED) or --identity-file",
    )?;
    Ok(derive_identity(seed.as_bytes())?)
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

    let commitments_file = args
        .commitments_file
        .clone()
        .or_else(|| config.group.commitments_file.clone())
        .context("No commitments file given. Pass --commitments-file or set group.commitments_file")?;

    println!("Loading commitments from: {}", commitments_file.display());
    let source = CommitmentsFile::new(&commitments_file).with_max_file_size(config.group.max_file_size);
    let registry = Arc::new(GroupRegistry::from_source(
        config.group.depth,
        config.group.root_history_size,
        &source,
    )?);
    if registry.is_empty() {
        return Err(anyhow::anyhow!(
            "No commitments found in '{}'",
            commitments_file.display()
        ));
    }
    println!("Group size: {}", registry.len());
    println!("Group root: {}", field_to_hex(registry.root()));

    let identity = load_identity(&args)?;
    let commitment = identity.commitment();
    println!("Identity commitment: {commitment}");

    let witness = registry.witness_for(&commitment).with_context(|| {
        format!(
            "Identity is not enrolled in '{}'. Make sure the seed corresponds to a listed commitment.",
            commitments_file.display()
        )
    })?;
    println!("Found commitment at index {}", witness.leaf_index);
    debug!("Witness: {witness}");

    info!("Preparing proving keys (k={CIRCUIT_K})");
    println!("Preparing proving keys...");
    let backend = Halo2Backend::<TREE_DEPTH>::load_or_generate(
        CIRCUIT_K,
        &config.keys.cache_dir,
        config.keys.enable_persistence,
    )?;
    let engine = ProofEngine::new(Arc::new(backend))
        .with_registry(Arc::clone(&registry))
        .with_limits(config.limits());

    println!("Generating ZK proof (this may take a while)...");
    let proof = engine
        .prove(&identity, &witness, &args.scope, args.signal.as_bytes())
        .context("Failed to create proof")?;
    println!("ZK proof generated, size: {} bytes", proof.zkp_proof.len());

    let output = args.output.unwrap_or(config.proof.output_file);
    println!("Writing proof to: {}", output.display());
    let json_output =
        serde_json::to_string_pretty(&proof).context("Failed to serialize proof to JSON")?;
    fs::write(&output, json_output)
        .with_context(|| format!("Failed to write proof file: {}", output.display()))?;

    println!("Proof successfully generated and saved!");
    println!("Scope: {}", proof.scope);
    println!("Nullifier hash: {}", proof.nullifier_hash());

    Ok(())
}
