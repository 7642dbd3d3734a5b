//! Line-oriented JSON helpers shared by the transaction log and the failure
//! cache.

use crate::error::StorageResult;
use gatehouse_core::Transaction;
use gatehouse_core::persist::tmp_path;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::debug;

/// Append one transaction as a compact JSON line, creating the file if
/// needed.
pub(crate) fn append_transaction(path: &Path, tx: &Transaction) -> StorageResult<()> {
    let mut line = tx.to_json_line()?;
    line.push('\n');

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    file.flush()?;
    Ok(())
}

/// Read every parseable transaction from `path` in file order.
///
/// Blank and malformed lines are skipped. A missing file reads as empty.
pub(crate) fn read_transactions(path: &Path) -> StorageResult<Vec<Transaction>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut out = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Transaction>(&line) {
            Ok(tx) => out.push(tx),
            Err(e) => debug!(path = %path.display(), line = index + 1, error = %e, "skipping malformed line"),
        }
    }
    Ok(out)
}

/// Atomically replace `path` with `records`, one per line.
pub(crate) fn rewrite_transactions(path: &Path, records: &[Transaction]) -> StorageResult<()> {
    let tmp = tmp_path(path);
    {
        let mut file = File::create(&tmp)?;
        for tx in records {
            file.write_all(tx.to_json_line()?.as_bytes())?;
            file.write_all(b"\n")?;
        }
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}
