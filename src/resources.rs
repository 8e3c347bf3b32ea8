//! Session Resource Tracker
//!
//! Owns every binary file the client mints during one session: preview
//! copies of the selected inputs and the single current stitch result. Each
//! named slot holds at most one file; replacing a slot releases the previous
//! occupant in the same operation, and `release_all` tears the whole session
//! directory down exactly once.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Slot name of the single current stitch result.
pub const RESULT_SLOT: &str = "result";

/// A locally addressable reference to session-owned bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    path: PathBuf,
}

impl ResourceHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug)]
pub struct ResourceTracker {
    root: PathBuf,
    slots: HashMap<String, PathBuf>,
    // Distinguishes successive occupants of the same slot on disk.
    sequence: u64,
    released: bool,
}

impl ResourceTracker {
    /// Create a tracker backed by a fresh per-session directory.
    pub fn new() -> io::Result<Self> {
        let root = std::env::temp_dir().join(format!("vstitch-{}", uuid::Uuid::new_v4()));
        Self::with_root(root)
    }

    /// Create a tracker rooted at the given directory (created if absent).
    pub fn with_root(root: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            slots: HashMap::new(),
            sequence: 0,
            released: false,
        })
    }

    /// Mint a new file for `slot` from raw bytes, releasing whatever the
    /// slot held before. The slot never references two files at once.
    pub fn acquire(&mut self, slot: &str, file_name: &str, bytes: &[u8]) -> io::Result<ResourceHandle> {
        let path = self.next_path(file_name);
        fs::write(&path, bytes)?;
        Ok(self.record(slot, path))
    }

    /// Copy a user-selected file into `slot`, for local preview/playback.
    pub fn acquire_from_file(&mut self, slot: &str, source: &Path) -> io::Result<ResourceHandle> {
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        let path = self.next_path(&file_name);
        fs::copy(source, &path)?;
        Ok(self.record(slot, path))
    }

    fn next_path(&mut self, file_name: &str) -> PathBuf {
        self.sequence += 1;
        self.root.join(format!("{}-{}", self.sequence, file_name))
    }

    /// Swap `path` into the slot, removing the previous occupant. The slot
    /// map never holds two entries for one slot.
    fn record(&mut self, slot: &str, path: PathBuf) -> ResourceHandle {
        if let Some(old) = self.slots.insert(slot.to_string(), path.clone()) {
            let _ = fs::remove_file(old);
        }
        ResourceHandle { path }
    }

    /// Swap the current stitch result for a new one.
    pub fn replace_result(&mut self, bytes: &[u8]) -> io::Result<ResourceHandle> {
        self.acquire(RESULT_SLOT, "output.mp4", bytes)
    }

    /// Path of the current stitch result, if one is live.
    pub fn result(&self) -> Option<&Path> {
        self.slots.get(RESULT_SLOT).map(PathBuf::as_path)
    }

    /// Number of live files this session owns.
    pub fn live_count(&self) -> usize {
        self.slots.len()
    }

    /// Release every recorded file and the session directory. Safe against
    /// repeated invocation; only the first call does any work.
    pub fn release_all(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for (_, path) in self.slots.drain() {
            let _ = fs::remove_file(path);
        }
        let _ = fs::remove_dir(&self.root);
    }
}

impl Drop for ResourceTracker {
    fn drop(&mut self) {
        self.release_all();
    }
}
