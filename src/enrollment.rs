//! Enrollment sources: the ordered list of commitments that seeds a group.
//!
//! A published commitments list is either newline-delimited or a JSON array of
//! strings. Each entry is a canonical hex field element (optionally
//! `0x`-prefixed) or a decimal integer.

use crate::identity::Commitment;
use anyhow::{Context, Result};
use log::{debug, info};
use pasta_curves::group::ff::PrimeField;
use pasta_curves::pallas;
use std::fs;
use std::path::{Path, PathBuf};

/// Default cap on the size of an enrollment file (10MB).
pub const DEFAULT_MAX_ENROLLMENT_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Supplies the ordered commitments to replay into a group at startup.
pub trait EnrollmentSource {
    /// Returns the commitments in insertion order.
    fn load_commitments(&self) -> Result<Vec<Commitment>>;
}

impl EnrollmentSource for Vec<Commitment> {
    fn load_commitments(&self) -> Result<Vec<Commitment>> {
        Ok(self.clone())
    }
}

/// A commitments list stored on disk.
#[derive(Debug, Clone)]
pub struct CommitmentsFile {
    path: PathBuf,
    max_file_size: u64,
}

impl CommitmentsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_file_size: DEFAULT_MAX_ENROLLMENT_FILE_SIZE,
        }
    }

    #[must_use]
    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }
}

impl EnrollmentSource for CommitmentsFile {
    fn load_commitments(&self) -> Result<Vec<Commitment>> {
        let metadata = fs::metadata(&self.path).with_context(|| {
            format!(
                "Failed to read commitments file metadata: {}",
                self.path.display()
            )
        })?;

        if metadata.len() > self.max_file_size {
            return Err(anyhow::anyhow!(
                "Commitments file too large: {} bytes (max {} bytes)",
                metadata.len(),
                self.max_file_size
            ));
        }

        let content = fs::read_to_string(&self.path).with_context(|| {
            format!("Failed to read commitments file: {}", self.path.display())
        })?;

        let commitments = parse_commitments(&content)
            .with_context(|| format!("Invalid commitments file: {}", self.path.display()))?;

        info!(
            "Loaded {} commitments from {}",
            commitments.len(),
            self.path.display()
        );
        Ok(commitments)
    }
}

/// Parses a single commitment from hex or decimal text.
///
/// # Errors
/// Returns an error if the entry is neither a canonical hex field element nor
/// a decimal integer below the field modulus.
///
/// ```
/// use zkp_anon_signal::enrollment::parse_commitment;
///
/// let from_decimal = parse_commitment("42").unwrap();
/// let from_hex = parse_commitment(&from_decimal.to_hex()).unwrap();
/// assert_eq!(from_decimal, from_hex);
/// ```
pub fn parse_commitment(entry: &str) -> Result<Commitment> {
    let trimmed = entry.trim();
    let is_prefixed = trimmed.starts_with("0x") || trimmed.starts_with("0X");

    if !is_prefixed && !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        // 64-digit all-numeric strings are ambiguous; treat them as hex, which
        // is what this crate writes.
        if trimmed.len() != crate::utils::FIELD_HEX_LEN {
            return pallas::Base::from_str_vartime(trimmed)
                .map(Commitment::from_field)
                .ok_or_else(|| {
                    anyhow::anyhow!("Decimal commitment '{trimmed}' is not a field element")
                });
        }
    }

    Commitment::from_hex(trimmed)
}

/// Parses a commitments list in either supported layout.
///
/// # Errors
/// Returns an error naming the first invalid entry.
pub fn parse_commitments(content: &str) -> Result<Vec<Commitment>> {
    let entries: Vec<String> = if content.trim_start().starts_with('[') {
        debug!("Parsing commitments as JSON array");
        serde_json::from_str(content).context("Failed to parse commitments JSON array")?
    } else {
        debug!("Parsing commitments as newline-delimited list");
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.trim().to_string())
            .collect()
    };

    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            parse_commitment(entry)
                .with_context(|| format!("Invalid commitment at entry {}: '{}'", i + 1, entry))
        })
        .collect()
}

/// Writes commitments as a newline-delimited hex list.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn save_commitments(path: &Path, commitments: &[Commitment]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut content = String::with_capacity(commitments.len() * 65);
    for commitment in commitments {
        content.push_str(&commitment.to_hex());
        content.push('\n');
    }

    fs::write(path, content)
        .with_context(|| format!("Failed to write commitments file: {}", path.display()))
}
