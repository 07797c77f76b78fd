//! Archive Extractor
//!
//! Unpacks release archives into the binaries directory.
//!
//! # Notes
//! - `.zip` archives are extracted as-is, directory tree preserved
//! - `.tar.gz` archives have their first path component stripped, so a
//!   version-named wrapper folder still lands flat in the target
//! - Entries escaping the target directory are skipped
//! - Symlinks must point inside the target directory, and no entry is
//!   written through a symlink; either violation fails as a corrupt archive
//! - Read failures are reported as a corrupt archive, write failures as a
//!   file system error

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

use crate::error::{ControlError, ControlResult};

/// Smallest archive we are willing to open
pub const MIN_ARCHIVE_BYTES: u64 = 100;

/// Archive type, decided by the asset's file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    pub fn from_name(name: &str) -> ControlResult<Self> {
        let lower = name.to_lowercase();
        if lower.ends_with(".zip") {
            Ok(ArchiveFormat::Zip)
        } else if lower.ends_with(".tar.gz") {
            Ok(ArchiveFormat::TarGz)
        } else {
            Err(ControlError::UnsupportedArchiveFormat(name.to_string()))
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }
}

/// Fail with `ArchiveTooSmall` unless the file could plausibly be an archive
pub fn ensure_plausible_size(archive: &Path) -> ControlResult<u64> {
    let size = fs::metadata(archive)?.len();
    if size < MIN_ARCHIVE_BYTES {
        return Err(ControlError::ArchiveTooSmall { size });
    }
    Ok(size)
}

/// Extract `archive` into `dest_dir` and return the number of files written
pub fn extract_archive(archive: &Path, format: ArchiveFormat, dest_dir: &Path) -> ControlResult<usize> {
    let size = ensure_plausible_size(archive)?;
    tracing::info!(
        "[Extractor] Extracting {} archive {:?} ({} bytes) to {:?}",
        format.label(),
        archive,
        size,
        dest_dir
    );

    fs::create_dir_all(dest_dir)?;

    let files = match format {
        ArchiveFormat::Zip => extract_zip(archive, dest_dir)?,
        ArchiveFormat::TarGz => extract_tar_gz(archive, dest_dir)?,
    };

    tracing::info!("[Extractor] Extraction complete: {} files", files);
    Ok(files)
}

fn extract_zip(zip_path: &Path, dest_dir: &Path) -> ControlResult<usize> {
    let file = File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| ControlError::CorruptArchive(e.to_string()))?;

    let mut files = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ControlError::CorruptArchive(e.to_string()))?;

        let relative_path = match entry.enclosed_name() {
            Some(path) => path.to_owned(),
            None => {
                tracing::warn!("[Extractor] Skipping unsafe entry {:?}", entry.name());
                continue;
            }
        };

        // Skip macOS metadata files
        let path_str = relative_path.to_string_lossy();
        if path_str.contains("__MACOSX") || path_str.contains(".DS_Store") {
            continue;
        }

        let out_path = dest_dir.join(&relative_path);
        ensure_no_link_in_parents(dest_dir, &relative_path)?;

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        if is_zip_symlink(entry.unix_mode()) {
            let mut target = String::new();
            entry
                .read_to_string(&mut target)
                .map_err(|e| ControlError::CorruptArchive(e.to_string()))?;
            ensure_link_target_inside(&relative_path, Path::new(&target))?;
            write_symlink(&target, &out_path)?;
        } else {
            remove_existing_link(&out_path)?;
            copy_entry(&mut entry, &out_path)?;
            apply_mode(&out_path, entry.unix_mode());
        }

        tracing::debug!("[Extractor] Extracted: {:?}", relative_path);
        files += 1;
    }

    Ok(files)
}

fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> ControlResult<usize> {
    let file = File::open(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));

    let entries = archive
        .entries()
        .map_err(|e| ControlError::CorruptArchive(format!("failed to read tar entries: {}", e)))?;

    let mut files = 0;
    for entry_result in entries {
        let mut entry = entry_result
            .map_err(|e| ControlError::CorruptArchive(format!("failed to read tar entry: {}", e)))?;

        let path = entry
            .path()
            .map_err(|e| ControlError::CorruptArchive(format!("bad entry path: {}", e)))?
            .into_owned();

        let Some(relative_path) = strip_first_component(&path) else {
            continue;
        };
        let out_path = dest_dir.join(&relative_path);
        ensure_no_link_in_parents(dest_dir, &relative_path)?;

        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&out_path)?;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = out_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                remove_existing_link(&out_path)?;
                copy_entry(&mut entry, &out_path)?;
                apply_mode(&out_path, entry.header().mode().ok());
                tracing::debug!("[Extractor] Extracted: {:?}", relative_path);
                files += 1;
            }
            EntryType::Symlink => {
                if let Some(parent) = out_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let target = entry
                    .link_name()
                    .map_err(|e| ControlError::CorruptArchive(e.to_string()))?
                    .ok_or_else(|| ControlError::CorruptArchive(format!("symlink {:?} has no target", path)))?;
                ensure_link_target_inside(&relative_path, &target)?;
                write_symlink(&target.to_string_lossy(), &out_path)?;
                files += 1;
            }
            other => {
                tracing::debug!("[Extractor] Skipping {:?} entry {:?}", other, path);
            }
        }
    }

    Ok(files)
}

/// Drop the leading path component; `None` for the wrapper itself or for
/// entries that would escape the target directory
fn strip_first_component(path: &Path) -> Option<PathBuf> {
    let mut components = path.components().filter(|c| !matches!(c, Component::CurDir));
    components.next()?;

    let mut stripped = PathBuf::new();
    for component in components {
        match component {
            Component::Normal(part) => stripped.push(part),
            _ => {
                tracing::warn!("[Extractor] Skipping unsafe entry {:?}", path);
                return None;
            }
        }
    }

    if stripped.as_os_str().is_empty() {
        None
    } else {
        Some(stripped)
    }
}

/// Reject link targets that are absolute or climb above the target directory.
///
/// `..` is only accepted before the first named component, so resolution
/// never walks up out of another symlink.
fn ensure_link_target_inside(relative_link: &Path, target: &Path) -> ControlResult<()> {
    let mut depth = relative_link
        .parent()
        .map(|p| p.components().filter(|c| matches!(c, Component::Normal(_))).count())
        .unwrap_or(0);
    let mut leading = true;

    for component in target.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir if leading && depth > 0 => depth -= 1,
            Component::Normal(_) => leading = false,
            _ => {
                return Err(ControlError::CorruptArchive(format!(
                    "symlink {:?} points outside the archive: {:?}",
                    relative_link, target
                )))
            }
        }
    }
    Ok(())
}

/// Fail if any directory between `dest_dir` and the entry is a symlink
fn ensure_no_link_in_parents(dest_dir: &Path, relative: &Path) -> ControlResult<()> {
    let Some(parent) = relative.parent() else {
        return Ok(());
    };
    let mut current = dest_dir.to_path_buf();
    for component in parent.components() {
        current.push(component);
        if is_symlink(&current) {
            return Err(ControlError::CorruptArchive(format!(
                "entry {:?} is nested under a symlink",
                relative
            )));
        }
    }
    Ok(())
}

/// A regular entry replaces a link of the same name instead of writing through it
fn remove_existing_link(path: &Path) -> ControlResult<()> {
    if is_symlink(path) {
        fs::remove_file(path)?;
    }
    Ok(())
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}

/// Copy one entry to disk, telling archive read errors apart from disk write errors
fn copy_entry<R: Read>(reader: &mut R, out_path: &Path) -> ControlResult<u64> {
    let mut out_file = File::create(out_path)?;
    let mut buf = vec![0u8; 64 * 1024];
    let mut written = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(ControlError::CorruptArchive(format!(
                    "failed to read {:?} from archive: {}",
                    out_path.file_name().unwrap_or_default(),
                    e
                )))
            }
        };
        out_file.write_all(&buf[..n])?;
        written += n as u64;
    }

    out_file.flush()?;
    Ok(written)
}

fn is_zip_symlink(mode: Option<u32>) -> bool {
    cfg!(unix) && mode.is_some_and(|m| m & 0o170000 == 0o120000)
}

#[cfg(unix)]
fn write_symlink(target: &str, link: &Path) -> ControlResult<()> {
    remove_existing_link(link)?;
    if link.is_file() {
        fs::remove_file(link)?;
    }
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_symlink(target: &str, link: &Path) -> ControlResult<()> {
    // No unprivileged symlinks; copy the sibling file the link points at
    let source = link.parent().map(|p| p.join(target)).unwrap_or_else(|| PathBuf::from(target));
    if source.is_file() {
        fs::copy(&source, link)?;
    } else {
        tracing::warn!("[Extractor] Cannot materialize link {:?} -> {}", link, target);
    }
    Ok(())
}

/// Carry the archived permission bits over, so `llama-server` stays executable
#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>) {
    use std::os::unix::fs::PermissionsExt;
    let mode = mode.unwrap_or(0) & 0o7777;
    if mode != 0 {
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
            tracing::warn!("[Extractor] Could not set mode {:o} on {:?}: {}", mode, path, e);
        }
    }
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>) {}
