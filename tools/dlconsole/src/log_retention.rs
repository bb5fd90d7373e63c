use crate::errors::ConsoleError;
use std::fs;
use std::path::{Path, PathBuf};

/// Deletes the oldest `.jsonl` files in `dir` until their combined size fits
/// `budget_bytes`. The live log at `keep` is never removed.
pub fn enforce_total_budget(
    dir: &Path,
    budget_bytes: u64,
    keep: &Path,
) -> Result<Vec<PathBuf>, ConsoleError> {
    let mut files = fs::read_dir(dir)
        .map_err(|e| ConsoleError::Io(e.to_string()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| path.extension().is_some_and(|ext| ext == "jsonl"))
        .collect::<Vec<_>>();

    files.sort_by(|a, b| {
        let ma = fs::metadata(a).ok().and_then(|m| m.modified().ok());
        let mb = fs::metadata(b).ok().and_then(|m| m.modified().ok());
        ma.cmp(&mb).then_with(|| a.cmp(b))
    });

    let mut total = files
        .iter()
        .filter_map(|path| fs::metadata(path).ok().map(|meta| meta.len()))
        .sum::<u64>();

    let mut deleted = Vec::new();
    for path in files {
        if total <= budget_bytes {
            break;
        }
        if path == keep {
            continue;
        }
        let len = fs::metadata(&path)
            .map_err(|e| ConsoleError::Io(e.to_string()))?
            .len();
        fs::remove_file(&path).map_err(|e| ConsoleError::Io(e.to_string()))?;
        total = total.saturating_sub(len);
        deleted.push(path);
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::enforce_total_budget;
    use std::fs;

    #[test]
    fn prunes_oldest_logs_but_keeps_the_live_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        let old = dir.path().join("a.jsonl");
        let live = dir.path().join("console.jsonl");
        fs::write(&live, vec![0u8; 40]).expect("live");
        std::thread::sleep(std::time::Duration::from_millis(5));
        fs::write(&old, vec![0u8; 40]).expect("old");
        fs::write(dir.path().join("notes.txt"), vec![0u8; 400]).expect("other");

        let deleted = enforce_total_budget(dir.path(), 50, &live).expect("pruned");
        assert_eq!(deleted, vec![old]);
        assert!(live.exists());
        assert!(dir.path().join("notes.txt").exists());
    }
}
