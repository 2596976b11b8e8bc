// File sink — where received file payloads land

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Characters that may not appear in a stored file name.
const HOSTILE_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Replacement for each hostile character.
const PLACEHOLDER: char = '_';

/// Strip path-hostile characters out of a client-supplied file name.
///
/// The result contains no separators or reserved characters, so it is always
/// safe to use as a single path component. `"../../etc/passwd"` becomes
/// `".._.._etc_passwd"`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if HOSTILE_CHARS.contains(&c) { PLACEHOLDER } else { c })
        .collect()
}

/// Destination for received file payloads.
///
/// `name` is already sanitized when an implementation sees it. Writes may
/// block; file intake is rare and bounded, so it runs inline on the session
/// task rather than through an async I/O layer.
pub trait FileSink: Send + Sync {
    /// Persist `bytes` under `name`, returning where they landed.
    fn write(&self, name: &str, bytes: &[u8]) -> io::Result<PathBuf>;
}

/// Sink writing into a directory on the local filesystem.
///
/// Stored files carry a `Received from client ` prefix so a delivery can
/// never silently overwrite an unrelated file of the same name.
#[derive(Debug, Clone)]
pub struct DiskSink {
    dir: PathBuf,
}

impl DiskSink {
    /// Sink rooted at `dir`. The directory must already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Sink rooted at the user's desktop, falling back to the current
    /// directory on hosts without one.
    pub fn desktop() -> Self {
        Self::new(dirs::desktop_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FileSink for DiskSink {
    fn write(&self, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.dir.join(format!("Received from client {name}"));
        fs::write(&path, bytes)?;
        Ok(path)
    }
}

// ============================================================================
// TESTS
// ============================================================================
