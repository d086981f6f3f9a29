//! Numbered capture folder allocation
//!
//! Each capture lands in its own `{prefix}{N}` folder under the base
//! directory. The next index is reconciled between a persisted counter and
//! what is actually on disk, so a folder name is never handed out twice:
//!
//! `next = max(persisted_next, 1 + max_existing_on_disk)`

use crate::utils::error::{CaptureError, CaptureResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Next candidate index per absolute base directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationState {
    next_index: BTreeMap<String, u64>,
}

impl AllocationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persisted next index for a base directory key, if any
    pub fn next_for(&self, base_key: &str) -> Option<u64> {
        self.next_index.get(base_key).copied()
    }

    pub fn len(&self) -> usize {
        self.next_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.next_index.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.next_index.iter().map(|(key, next)| (key.as_str(), *next))
    }
}

/// Outcome of planning an allocation, shared by real and preview mode
struct Plan {
    base_key: String,
    index: u64,
    target: PathBuf,
}

/// Pick the next numbered folder and advance the counter
///
/// The folder itself is not created; the session controller does that right
/// before spawning so a racing creator can be detected.
pub fn allocate(base: &Path, prefix: &str, state: &mut AllocationState) -> CaptureResult<PathBuf> {
    let plan = plan(base, prefix, state)?;
    state
        .next_index
        .insert(plan.base_key, plan.index.saturating_add(1));

    tracing::debug!("Allocated capture folder {:?}", plan.target);
    Ok(plan.target)
}

/// Same pick as [`allocate`], leaving the state untouched
pub fn preview(base: &Path, prefix: &str, state: &AllocationState) -> CaptureResult<PathBuf> {
    Ok(plan(base, prefix, state)?.target)
}

fn plan(base: &Path, prefix: &str, state: &AllocationState) -> CaptureResult<Plan> {
    fs::create_dir_all(base).map_err(|e| CaptureError::directory(base, e))?;
    let metadata = fs::metadata(base).map_err(|e| CaptureError::directory(base, e))?;
    if !metadata.is_dir() {
        return Err(CaptureError::directory(
            base,
            io::Error::new(io::ErrorKind::Other, "not a directory"),
        ));
    }

    let base = fs::canonicalize(base).map_err(|e| CaptureError::directory(base, e))?;
    let base_key = base.to_string_lossy().to_string();

    let max_existing = max_existing_index(&base, prefix)?;
    let persisted = state.next_for(&base_key).unwrap_or(1);
    let index = persisted.max(max_existing.saturating_add(1));

    Ok(Plan {
        target: base.join(format!("{prefix}{index}")),
        base_key,
        index,
    })
}

/// Greatest `N` among children named `{prefix}N`, 0 if none
fn max_existing_index(base: &Path, prefix: &str) -> CaptureResult<u64> {
    let entries = fs::read_dir(base).map_err(|e| CaptureError::directory(base, e))?;

    let mut max_existing = 0;
    for entry in entries {
        // Unreadable entries can only make us skip an index, never reuse one
        let Ok(entry) = entry else { continue };
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };

        if let Some(index) = suffix_index(name, prefix) {
            max_existing = max_existing.max(index);
        }
    }

    Ok(max_existing)
}

fn suffix_index(name: &str, prefix: &str) -> Option<u64> {
    let digits = name.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Allocation state behind a lock for callers on several threads
#[derive(Debug, Clone, Default)]
pub struct SharedAllocations {
    inner: Arc<Mutex<AllocationState>>,
}

impl SharedAllocations {
    pub fn new(state: AllocationState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Scan and counter update happen under one lock
    pub fn allocate(&self, base: &Path, prefix: &str) -> CaptureResult<PathBuf> {
        allocate(base, prefix, &mut self.inner.lock())
    }

    pub fn preview(&self, base: &Path, prefix: &str) -> CaptureResult<PathBuf> {
        preview(base, prefix, &self.inner.lock())
    }

    /// Copy of the current state for persisting
    pub fn snapshot(&self) -> AllocationState {
        self.inner.lock().clone()
    }

    /// Run `f` with exclusive access to the state
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut AllocationState) -> R) -> R {
        f(&mut self.inner.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::tempdir;

    fn name_of(path: &Path) -> String {
        path.file_name().unwrap().to_string_lossy().to_string()
    }

    #[test]
    fn test_allocate_skips_past_existing() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("tape1")).unwrap();
        fs::create_dir(dir.path().join("tape3")).unwrap();

        let mut state = AllocationState::new();
        let target = allocate(dir.path(), "tape", &mut state).unwrap();

        assert_eq!(name_of(&target), "tape4");
        assert!(!target.exists());

        let key = fs::canonicalize(dir.path()).unwrap();
        assert_eq!(state.next_for(&key.to_string_lossy()), Some(5));
    }

    #[test]
    fn test_allocate_empty_base_starts_at_one() {
        let dir = tempdir().unwrap();
        let mut state = AllocationState::new();

        let first = allocate(dir.path(), "tape", &mut state).unwrap();
        let second = allocate(dir.path(), "tape", &mut state).unwrap();

        assert_eq!(name_of(&first), "tape1");
        assert_eq!(name_of(&second), "tape2");
    }

    #[test]
    fn test_persisted_counter_wins_over_disk() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("tape2")).unwrap();

        let mut state = AllocationState::new();
        let key = fs::canonicalize(dir.path()).unwrap();
        state
            .next_index
            .insert(key.to_string_lossy().to_string(), 10);

        let target = allocate(dir.path(), "tape", &mut state).unwrap();
        assert_eq!(name_of(&target), "tape10");
        assert_eq!(state.next_for(&key.to_string_lossy()), Some(11));
    }

    #[test]
    fn test_scan_matches_prefix_and_digits_only() {
        let dir = tempdir().unwrap();
        for name in ["tape7x", "tapex", "tape", "other9", "TAPE20"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("tape5"), b"").unwrap();

        let mut state = AllocationState::new();
        let target = allocate(dir.path(), "tape", &mut state).unwrap();

        // Plain files still occupy the name
        assert_eq!(name_of(&target), "tape6");
    }

    #[test]
    fn test_preview_leaves_state_untouched() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("tape1")).unwrap();

        let state = AllocationState::new();
        let before = state.clone();
        let previewed = preview(dir.path(), "tape", &state).unwrap();

        assert_eq!(name_of(&previewed), "tape2");
        assert_eq!(state, before);

        let mut state = state;
        let real = allocate(dir.path(), "tape", &mut state).unwrap();
        assert_eq!(real, previewed);
    }

    #[test]
    fn test_allocate_creates_missing_base() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("nested").join("captures");

        let mut state = AllocationState::new();
        let target = allocate(&base, "tape", &mut state).unwrap();

        assert!(base.is_dir());
        assert_eq!(name_of(&target), "tape1");
    }

    #[test]
    fn test_base_that_is_a_file_fails() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, b"x").unwrap();

        let mut state = AllocationState::new();
        let result = allocate(&file, "tape", &mut state);

        assert!(matches!(result, Err(CaptureError::Directory { .. })));
        assert!(state.is_empty());
    }

    #[test]
    fn test_suffix_overflow_is_ignored() {
        assert_eq!(suffix_index("tape99999999999999999999999", "tape"), None);
        assert_eq!(suffix_index("tape042", "tape"), Some(42));
        assert_eq!(suffix_index("tape-1", "tape"), None);
    }

    #[test]
    fn test_shared_allocations_never_repeat() {
        let dir = tempdir().unwrap();
        let shared = SharedAllocations::default();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = shared.clone();
                let base = dir.path().to_path_buf();
                std::thread::spawn(move || {
                    (0..10)
                        .map(|_| shared.allocate(&base, "tape").unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for target in handle.join().unwrap() {
                assert!(seen.insert(target), "index handed out twice");
            }
        }
        assert_eq!(seen.len(), 80);
        assert_eq!(shared.snapshot().iter().next().map(|(_, n)| n), Some(81));
    }

    #[test]
    fn test_state_serializes_as_plain_map() {
        let mut state = AllocationState::new();
        state.next_index.insert("/srv/captures".to_string(), 3);

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json, serde_json::json!({ "/srv/captures": 3 }));
    }
}
