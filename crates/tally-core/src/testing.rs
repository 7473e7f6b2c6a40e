//! Fixture trees for tests.
//!
//! Provides `TestEnvironment` to manage:
//! - An isolated temporary root that is removed on drop
//! - Text files and directories at relative paths
//! - Zip archives, including archives nested inside archives
//!
//! # Usage
//!
//! ```ignore
//! use tally_core::testing::TestEnvironment;
//!
//! let env = TestEnvironment::new()?;
//! env.create_file("second.txt", b"Second, file!")?;
//! env.create_zip("file.zip", &[("test/folder1/first.txt", b"File file FILE.")])?;
//! ```

use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::Result;

/// Atomic counter for unique fixture IDs
static FIXTURE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated fixture tree rooted in a temporary directory
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Root that requests should point at
    pub root: PathBuf,
    /// Unique fixture ID
    pub fixture_id: u32,
}

impl TestEnvironment {
    /// Create a new, empty fixture root
    pub fn new() -> Result<Self> {
        let fixture_id = FIXTURE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().join(format!("root-{}", fixture_id));
        fs::create_dir_all(&root)?;

        Ok(Self {
            _temp_dir: temp_dir,
            root,
            fixture_id,
        })
    }

    /// Absolute path for a fixture-relative path
    pub fn path(&self, relative_path: &str) -> PathBuf {
        self.root.join(relative_path)
    }

    /// Create a file with content, creating parent directories
    pub fn create_file(&self, relative_path: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.path(relative_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Create a directory
    pub fn create_dir(&self, relative_path: &str) -> Result<PathBuf> {
        let path = self.path(relative_path);
        fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Create a zip archive holding `entries` (name, content)
    pub fn create_zip(&self, relative_path: &str, entries: &[(&str, &[u8])]) -> Result<PathBuf> {
        let path = self.path(relative_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_zip(&path, entries)?;
        Ok(path)
    }

    /// Copy the whole fixture tree to a sibling root, for repeat runs on
    /// fresh extraction targets
    pub fn duplicate(&self, name: &str) -> Result<PathBuf> {
        let target = self
            .root
            .parent()
            .unwrap_or(&self.root)
            .join(format!("{}-{}", name, self.fixture_id));
        copy_tree(&self.root, &target)?;
        Ok(target)
    }
}

/// Write a zip archive holding `entries` to `path`
pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) -> Result<()> {
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for (name, content) in entries {
        zip.start_file(*name, options)?;
        zip.write_all(content)?;
    }
    zip.finish()?;
    Ok(())
}

/// Build a zip archive in memory, for nesting inside another archive
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, content) in entries {
        zip.start_file(*name, options)?;
        zip.write_all(content)?;
    }
    Ok(zip.finish()?.into_inner())
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to)?;
    for entry in walkdir::WalkDir::new(from).min_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let dest = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else {
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}
