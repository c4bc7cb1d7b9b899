//! Packaging staged output into a single zip artifact
//!
//! Archives are written to a `.partial` sibling of the canonical path and
//! renamed into place only once complete, so a reader either sees a whole
//! artifact or none at all.

use crate::error::GenerationError;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Zip `source_dir` into `dest` atomically.
///
/// On failure nothing is left at `dest` and the partial file is removed.
pub async fn write_atomic(source_dir: &Path, dest: &Path) -> Result<PathBuf, GenerationError> {
    let source = source_dir.to_path_buf();
    let target = dest.to_path_buf();

    tokio::task::spawn_blocking(move || write_atomic_blocking(&source, &target))
        .await
        .map_err(|e| GenerationError::packaging(dest, format!("archive task failed: {}", e)))?
}

fn write_atomic_blocking(source: &Path, dest: &Path) -> Result<PathBuf, GenerationError> {
    let partial = partial_path(dest);

    let entries = match zip_directory(source, &partial) {
        Ok(entries) => entries,
        Err(e) => {
            discard(&partial);
            return Err(GenerationError::packaging(dest, e));
        }
    };

    if let Err(e) = std::fs::rename(&partial, dest) {
        discard(&partial);
        return Err(GenerationError::packaging(dest, format!("moving into place: {}", e)));
    }

    debug!("Archived {} entries into {}", entries, dest.display());
    Ok(dest.to_path_buf())
}

/// Unique temporary name next to `dest`
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(format!(".{}.partial", Uuid::new_v4().simple()));
    PathBuf::from(name)
}

fn discard(partial: &Path) {
    if let Err(e) = std::fs::remove_file(partial) {
        if e.kind() != io::ErrorKind::NotFound {
            debug!("Failed to remove {}: {}", partial.display(), e);
        }
    }
}

/// Write every file and directory under `source` into a new zip at `target`.
///
/// Entry names are relative to `source` and always use `/`. Symlinks are
/// skipped. Returns the number of entries written.
fn zip_directory(source: &Path, target: &Path) -> io::Result<usize> {
    if !source.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", source.display()),
        ));
    }

    let file = File::create(target)?;
    let mut zip = ZipWriter::new(file);
    let mut entries = 0;

    for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        let name = entry_name(source, entry.path())?;
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(unix_mode(&entry)?);

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{}/", name), options)
                .map_err(io::Error::other)?;
        } else if entry.file_type().is_file() {
            zip.start_file(name, options).map_err(io::Error::other)?;
            let mut input = File::open(entry.path())?;
            io::copy(&mut input, &mut zip)?;
        } else {
            debug!("Skipping non-regular file {}", entry.path().display());
            continue;
        }
        entries += 1;
    }

    let file = zip.finish().map_err(io::Error::other)?;
    file.sync_all()?;
    Ok(entries)
}

fn entry_name(source: &Path, path: &Path) -> io::Result<String> {
    let relative = path
        .strip_prefix(source)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let parts = relative
        .components()
        .map(|c| {
            c.as_os_str().to_str().map(str::to_string).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("non UTF-8 file name {}", path.display()),
                )
            })
        })
        .collect::<io::Result<Vec<_>>>()?;
    Ok(parts.join("/"))
}

#[cfg(unix)]
fn unix_mode(entry: &walkdir::DirEntry) -> io::Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = entry.metadata().map_err(io::Error::other)?;
    Ok(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn unix_mode(entry: &walkdir::DirEntry) -> io::Result<u32> {
    Ok(if entry.file_type().is_dir() { 0o755 } else { 0o644 })
}
