//! Signal ledger: consumed nullifiers per scope and the accepted signal log.
//!
//! `check_and_record` is the only mutation. It holds the scope's lock across
//! the membership test and the insert, so concurrent submissions of the same
//! nullifier in one scope are serialized while different scopes proceed in
//! parallel.

use crate::error::{SignalError, SignalResult};
use crate::utils::{field_from_hex, field_to_bytes, field_to_hex};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use parking_lot::Mutex;
use pasta_curves::pallas;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

type NullifierSet = Arc<Mutex<HashSet<[u8; 32]>>>;

/// A signal accepted into the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedSignal {
    pub scope: String,
    /// Canonical hex of the nullifier hash
    pub nullifier_hash: String,
    #[serde(with = "hex::serde")]
    pub signal: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    accepted: Vec<AcceptedSignal>,
}

#[derive(Debug, Default)]
pub struct SignalLedger {
    scopes: Mutex<HashMap<String, NullifierSet>>,
    accepted: Mutex<Vec<AcceptedSignal>>,
}

impl SignalLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn scope_set(&self, scope: &str) -> NullifierSet {
        let mut scopes = self.scopes.lock();
        Arc::clone(scopes.entry(scope.to_string()).or_default())
    }

    /// Atomically records `nullifier_hash` under `scope`.
    ///
    /// # Errors
    /// Returns [`SignalError::DuplicateNullifier`] if the nullifier was
    /// already recorded in this scope. The ledger is unchanged in that case.
    pub fn check_and_record(
        &self,
        scope: &str,
        nullifier_hash: pallas::Base,
        signal: &[u8],
    ) -> SignalResult<AcceptedSignal> {
        let set = self.scope_set(scope);
        let mut consumed = set.lock();

        if !consumed.insert(field_to_bytes(nullifier_hash)) {
            debug!("Rejected reused nullifier in scope '{scope}'");
            return Err(SignalError::DuplicateNullifier {
                scope: scope.to_string(),
                nullifier: field_to_hex(nullifier_hash),
            });
        }

        let entry = AcceptedSignal {
            scope: scope.to_string(),
            nullifier_hash: field_to_hex(nullifier_hash),
            signal: signal.to_vec(),
        };
        // Appended while the scope lock is held so the log order agrees with
        // the order in which nullifiers were consumed within a scope.
        self.accepted.lock().push(entry.clone());
        drop(consumed);

        info!("Recorded nullifier {} in scope '{scope}'", entry.nullifier_hash);
        Ok(entry)
    }

    #[must_use]
    pub fn is_consumed(&self, scope: &str, nullifier_hash: &pallas::Base) -> bool {
        let set = self.scopes.lock().get(scope).cloned();
        set.is_some_and(|set| set.lock().contains(&field_to_bytes(*nullifier_hash)))
    }

    /// Accepted signals in acceptance order.
    #[must_use]
    pub fn accepted(&self) -> Vec<AcceptedSignal> {
        self.accepted.lock().clone()
    }

    #[must_use]
    pub fn accepted_in_scope(&self, scope: &str) -> Vec<AcceptedSignal> {
        self.accepted
            .lock()
            .iter()
            .filter(|entry| entry.scope == scope)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.accepted.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loads a ledger previously written by [`SignalLedger::save`].
    /// A missing file yields an empty ledger.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or if it records
    /// the same nullifier twice in one scope.
    pub fn load(path: &Path) -> Result<Self> {
        let ledger = Self::new();
        if !path.exists() {
            debug!("No ledger at {}, starting empty", path.display());
            return Ok(ledger);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read ledger file: {}", path.display()))?;
        let file: LedgerFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse ledger file: {}", path.display()))?;

        for (i, entry) in file.accepted.iter().enumerate() {
            let nullifier = field_from_hex(&entry.nullifier_hash)
                .with_context(|| format!("Invalid nullifier in ledger entry {}", i + 1))?;
            ledger
                .check_and_record(&entry.scope, nullifier, &entry.signal)
                .with_context(|| format!("Corrupt ledger entry {}", i + 1))?;
        }

        info!(
            "Loaded {} accepted signals from {}",
            ledger.len(),
            path.display()
        );
        Ok(ledger)
    }

    /// Writes the accepted log as JSON, replacing `path` atomically.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = LedgerFile {
            accepted: self.accepted(),
        };
        let json = serde_json::to_string_pretty(&file).context("Failed to serialize ledger")?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("Failed to write ledger file: {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace ledger file: {}", path.display()))?;

        debug!("Saved {} accepted signals to {}", file.accepted.len(), path.display());
        Ok(())
    }
}

/// Advisory lock on a ledger file, held from load until the updated ledger
/// has been saved. The lock is a `<ledger>.lock` file created exclusively and
/// removed on drop.
#[derive(Debug)]
pub struct LedgerLock {
    path: PathBuf,
}

impl LedgerLock {
    /// Takes the lock for the ledger at `ledger_path`.
    ///
    /// # Errors
    /// Returns an error if another process holds the lock or the lock file
    /// cannot be created. A lock left behind by a crashed process must be
    /// removed by hand.
    pub fn acquire(ledger_path: &Path) -> Result<Self> {
        let mut name = ledger_path.as_os_str().to_owned();
        name.push(".lock");
        let path = PathBuf::from(name);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(anyhow::anyhow!(
                    "Ledger {} is in use by another verifier (lock file {})",
                    ledger_path.display(),
                    path.display()
                ));
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to create lock file: {}", path.display()));
            }
        };
        let lock = Self { path };
        writeln!(file, "{}", std::process::id())
            .with_context(|| format!("Failed to write lock file: {}", lock.path.display()))?;

        debug!("Acquired ledger lock {}", lock.path.display());
        Ok(lock)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release ledger lock {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use tempfile::TempDir;

    fn nullifier(n: u64) -> pallas::Base {
        pallas::Base::from(n)
    }

    #[test]
    fn test_second_record_is_rejected_without_mutation() {
        let ledger = SignalLedger::new();
        let accepted = ledger
            .check_and_record("event-1", nullifier(1), b"first")
            .unwrap();
        assert_eq!(accepted.signal, b"first");

        let err = ledger
            .check_and_record("event-1", nullifier(1), b"second")
            .unwrap_err();
        assert!(matches!(err, SignalError::DuplicateNullifier { .. }));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.accepted()[0].signal, b"first");
    }

    #[test]
    fn test_scopes_are_independent() {
        let ledger = SignalLedger::new();
        assert!(ledger.check_and_record("a", nullifier(7), b"x").is_ok());
        assert!(ledger.check_and_record("b", nullifier(7), b"x").is_ok());
        assert!(ledger.check_and_record("a", nullifier(7), b"x").is_err());
        assert!(ledger.check_and_record("b", nullifier(7), b"x").is_err());

        assert!(ledger.is_consumed("a", &nullifier(7)));
        assert!(!ledger.is_consumed("c", &nullifier(7)));
        assert_eq!(ledger.accepted_in_scope("a").len(), 1);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_racing_callers_accept_exactly_once() {
        const RACERS: usize = 16;
        let ledger = SignalLedger::new();
        let barrier = Barrier::new(RACERS);
        let wins = AtomicUsize::new(0);
        let duplicates = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for i in 0..RACERS {
                let (ledger, barrier, wins, duplicates) = (&ledger, &barrier, &wins, &duplicates);
                scope.spawn(move || {
                    barrier.wait();
                    match ledger.check_and_record("race", nullifier(42), &[i as u8]) {
                        Ok(_) => wins.fetch_add(1, Ordering::SeqCst),
                        Err(SignalError::DuplicateNullifier { .. }) => {
                            duplicates.fetch_add(1, Ordering::SeqCst)
                        }
                        Err(e) => panic!("unexpected error: {e}"),
                    };
                });
            }
        });

        assert_eq!(wins.load(Ordering::SeqCst), 1);
        assert_eq!(duplicates.load(Ordering::SeqCst), RACERS - 1);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_parallel_scopes_each_accept_once() {
        let ledger = SignalLedger::new();
        std::thread::scope(|scope| {
            for s in 0..8 {
                let ledger = &ledger;
                scope.spawn(move || {
                    let name = format!("scope-{s}");
                    for n in 0..20 {
                        ledger.check_and_record(&name, nullifier(n), b"x").unwrap();
                    }
                });
            }
        });
        assert_eq!(ledger.len(), 160);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("ledger.json");

        let ledger = SignalLedger::new();
        ledger.check_and_record("event-1", nullifier(1), b"Hello world").unwrap();
        ledger.check_and_record("event-2", nullifier(1), b"").unwrap();
        ledger.save(&path).unwrap();

        let loaded = SignalLedger::load(&path).unwrap();
        assert_eq!(loaded.accepted(), ledger.accepted());
        assert!(loaded.is_consumed("event-1", &nullifier(1)));
        assert!(loaded
            .check_and_record("event-1", nullifier(1), b"again")
            .is_err());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let ledger = SignalLedger::load(&temp_dir.path().join("absent.json")).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_load_rejects_repeated_nullifier() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("ledger.json");
        let entry = AcceptedSignal {
            scope: "event-1".into(),
            nullifier_hash: field_to_hex(nullifier(3)),
            signal: vec![],
        };
        let file = LedgerFile {
            accepted: vec![entry.clone(), entry],
        };
        fs::write(&path, serde_json::to_string(&file).unwrap()).unwrap();

        let err = SignalLedger::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("entry 2"));
    }

    #[test]
    fn test_ledger_lock_is_exclusive_until_dropped() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("ledger.json");

        let held = LedgerLock::acquire(&path).unwrap();
        assert!(held.path().exists());
        let err = LedgerLock::acquire(&path).unwrap_err();
        assert!(err.to_string().contains("in use"));

        let lock_path = held.path().to_path_buf();
        drop(held);
        assert!(!lock_path.exists());
        assert!(LedgerLock::acquire(&path).is_ok());
    }
}
