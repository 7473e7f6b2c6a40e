//! Archive expansion
//!
//! An archive `dir/bundle.zip` is expanded into `dir/bundle/`. When that name
//! is already taken a millisecond timestamp is appended (`dir/bundle1712...`)
//! so earlier extractions are never overwritten. Only text documents and
//! nested archives are written out; every other entry is skipped.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, instrument, warn};
use zip::ZipArchive;

use crate::{has_extension, Result};

/// Upper bound on suffix attempts before giving up on a target name
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Strip `..`, `.`, root and drive components from an entry name
///
/// Returns `None` if nothing is left (e.g. an entry named `../..`).
#[inline]
fn sanitize_entry_name(name: &str) -> Option<PathBuf> {
    let mut sanitized = PathBuf::new();
    for component in Path::new(name).components() {
        if let Component::Normal(part) = component {
            sanitized.push(part);
        }
    }
    if sanitized.as_os_str().is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

/// Expands archives next to themselves, keeping only countable entries
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    text_extension: String,
    archive_extension: String,
}

impl Default for ArchiveExtractor {
    fn default() -> Self {
        Self::new(crate::DEFAULT_TEXT_EXTENSION, crate::DEFAULT_ARCHIVE_EXTENSION)
    }
}

impl ArchiveExtractor {
    pub fn new(text_extension: impl Into<String>, archive_extension: impl Into<String>) -> Self {
        Self {
            text_extension: text_extension.into(),
            archive_extension: archive_extension.into(),
        }
    }

    /// Whether an archive entry should be written out
    pub fn accepts_entry(&self, name: &str) -> bool {
        has_extension(name, &self.text_extension) || has_extension(name, &self.archive_extension)
    }

    /// Expand `archive` and return the directory it was expanded into
    ///
    /// The target directory is claimed only once the archive's central
    /// directory has been read, so an unreadable archive leaves nothing
    /// behind. A corrupt entry further in can leave a partial directory.
    #[instrument(skip(self), level = "debug")]
    pub fn extract(&self, archive: &Path) -> Result<PathBuf> {
        let file = File::open(archive)?;
        let mut zip = ZipArchive::new(BufReader::new(file))?;

        let target = claim_target_dir(archive)?;
        debug!(archive = %archive.display(), target = %target.display(), entries = zip.len(), "Expanding archive");

        let mut written = 0usize;
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i)?;
            if entry.is_dir() {
                continue;
            }

            let raw_name = entry.name().to_string();
            if !self.accepts_entry(&raw_name) {
                debug!(entry = %raw_name, "Skipping entry with unsupported extension");
                continue;
            }

            let Some(relative) = sanitize_entry_name(&raw_name) else {
                warn!(archive = %archive.display(), entry = %raw_name, "Skipping entry with unusable path");
                continue;
            };

            let out_path = target.join(relative);
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = BufWriter::new(File::create(&out_path)?);
            io::copy(&mut entry, &mut out)?;
            out.flush()?;
            written += 1;
        }

        debug!(target = %target.display(), written, "Archive expanded");
        Ok(target)
    }
}

/// Directory an archive expands into when the name is free
pub fn target_dir_for(archive: &Path) -> PathBuf {
    archive.with_extension("")
}

/// Create a fresh, previously nonexistent directory for `archive`
///
/// `create_dir` is the claim: it fails with `AlreadyExists` if a file or
/// directory of that name exists, including one created concurrently.
fn claim_target_dir(archive: &Path) -> Result<PathBuf> {
    let base = target_dir_for(archive);
    if let Some(parent) = base.parent() {
        fs::create_dir_all(parent)?;
    }

    match fs::create_dir(&base) {
        Ok(()) => return Ok(base),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e.into()),
    }

    let stamp = chrono::Utc::now().timestamp_millis();
    let mut stamped = base.clone().into_os_string();
    stamped.push(stamp.to_string());
    let stamped = PathBuf::from(stamped);

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let candidate = if attempt == 0 {
            stamped.clone()
        } else {
            let mut name = stamped.clone().into_os_string();
            name.push(format!("-{}", attempt));
            PathBuf::from(name)
        };
        match fs::create_dir(&candidate) {
            Ok(()) => {
                debug!(wanted = %base.display(), used = %candidate.display(), "Extraction target renamed on collision");
                return Ok(candidate);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free extraction directory for {}", archive.display()),
    )
    .into())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{write_zip, zip_bytes};
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_entry_name() {
        assert_eq!(
            sanitize_entry_name("a/b/c.txt"),
            Some(PathBuf::from("a/b/c.txt"))
        );
        assert_eq!(
            sanitize_entry_name("../../etc/passwd.txt"),
            Some(PathBuf::from("etc/passwd.txt"))
        );
        assert_eq!(
            sanitize_entry_name("/abs/x.txt"),
            Some(PathBuf::from("abs/x.txt"))
        );
        assert_eq!(sanitize_entry_name("../.."), None);
    }

    #[test]
    fn test_extract_keeps_structure_and_filters_entries() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("file.zip");
        write_zip(
            &archive,
            &[
                ("test/folder1/first.txt", b"File file FILE.".as_slice()),
                ("test/image.png", b"\x89PNG".as_slice()),
                ("test/NOTES.TXT", b"upper".as_slice()),
            ],
        )
        .unwrap();

        let target = ArchiveExtractor::default().extract(&archive).unwrap();

        assert_eq!(target, temp.path().join("file"));
        assert_eq!(
            fs::read_to_string(target.join("test/folder1/first.txt")).unwrap(),
            "File file FILE."
        );
        assert!(target.join("test/NOTES.TXT").exists());
        assert!(!target.join("test/image.png").exists());
    }

    #[test]
    fn test_nested_archive_entries_are_copied_verbatim() {
        let temp = TempDir::new().unwrap();
        let inner = zip_bytes(&[("deep.txt", b"inner words".as_slice())]).unwrap();
        let archive = temp.path().join("outer.zip");
        write_zip(&archive, &[("inner.zip", inner.as_slice())]).unwrap();

        let target = ArchiveExtractor::default().extract(&archive).unwrap();

        assert_eq!(fs::read(target.join("inner.zip")).unwrap(), inner);
    }

    #[test]
    fn test_collision_gets_a_distinct_directory() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("data.zip");
        write_zip(&archive, &[("a.txt", b"one".as_slice())]).unwrap();

        fs::create_dir(temp.path().join("data")).unwrap();
        fs::write(temp.path().join("data/a.txt"), "existing").unwrap();

        let extractor = ArchiveExtractor::default();
        let first = extractor.extract(&archive).unwrap();
        let second = extractor.extract(&archive).unwrap();

        assert_ne!(first, temp.path().join("data"));
        assert_ne!(first, second);
        assert!(first
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("data"));
        assert_eq!(
            fs::read_to_string(temp.path().join("data/a.txt")).unwrap(),
            "existing"
        );
        assert_eq!(fs::read_to_string(first.join("a.txt")).unwrap(), "one");
        assert_eq!(fs::read_to_string(second.join("a.txt")).unwrap(), "one");
    }

    #[test]
    fn test_collision_with_plain_file() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("report.zip");
        write_zip(&archive, &[("r.txt", b"x".as_slice())]).unwrap();
        fs::write(temp.path().join("report"), "not a directory").unwrap();

        let target = ArchiveExtractor::default().extract(&archive).unwrap();
        assert!(target.is_dir());
        assert!(target.join("r.txt").exists());
    }

    #[test]
    fn test_corrupt_archive_is_an_error() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("broken.zip");
        fs::write(&archive, b"this is not a zip file").unwrap();

        let err = ArchiveExtractor::default().extract(&archive).unwrap_err();
        assert!(matches!(err, crate::TallyError::Archive(_)), "{:?}", err);
        assert!(!temp.path().join("broken").exists());
    }

    #[test]
    fn test_missing_archive_is_io_error() {
        let temp = TempDir::new().unwrap();
        let err = ArchiveExtractor::default()
            .extract(&temp.path().join("absent.zip"))
            .unwrap_err();
        assert!(matches!(err, crate::TallyError::Io(_)));
    }

    #[test]
    fn test_custom_extensions() {
        let extractor = ArchiveExtractor::new("md", "jar");
        assert!(extractor.accepts_entry("docs/readme.md"));
        assert!(extractor.accepts_entry("lib/inner.jar"));
        assert!(!extractor.accepts_entry("notes.txt"));
    }
}
