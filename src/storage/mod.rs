//! Persistence layer.
//!
//! Saves and loads the ledger (wallets, transactions, bets) as a single
//! JSON snapshot. Writes go to a sibling temp file first and are renamed
//! into place, so a crash mid-write leaves the previous snapshot intact.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::ledger::LedgerSnapshot;

/// Save a ledger snapshot to `path`.
pub fn save_snapshot(snapshot: &LedgerSnapshot, path: &str) -> Result<()> {
    let json =
        serde_json::to_string_pretty(snapshot).context("Failed to serialise ledger snapshot")?;

    let tmp = format!("{path}.tmp");
    std::fs::write(&tmp, &json).with_context(|| format!("Failed to write snapshot to {tmp}"))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move snapshot into place at {path}"))?;

    debug!(
        path,
        wallets = snapshot.wallets.len(),
        bets = snapshot.bets.len(),
        "Ledger snapshot saved"
    );
    Ok(())
}

/// Load a ledger snapshot. Returns None if the file doesn't exist.
pub fn load_snapshot(path: &str) -> Result<Option<LedgerSnapshot>> {
    if !Path::new(path).exists() {
        info!(path, "No ledger snapshot found, starting empty");
        return Ok(None);
    }

    let json =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read snapshot {path}"))?;
    let snapshot: LedgerSnapshot = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse snapshot {path}"))?;

    info!(
        path,
        wallets = snapshot.wallets.len(),
        transactions = snapshot.transactions.len(),
        bets = snapshot.bets.len(),
        "Ledger snapshot loaded"
    );
    Ok(Some(snapshot))
}

/// Delete the snapshot file (for testing or reset).
pub fn delete_snapshot(path: &str) -> Result<()> {
    if Path::new(path).exists() {
        std::fs::remove_file(path).with_context(|| format!("Failed to delete snapshot {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
