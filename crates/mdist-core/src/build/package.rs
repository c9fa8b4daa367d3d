//! Deterministic release archive writer
//!
//! Walks the staging tree with children sorted by name and writes tar
//! entries whose metadata depends only on content, relative path, the
//! executable bit and the mtime clamp. The gzip container carries the clamp
//! as its own timestamp and no file name.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::GzBuilder;
use tar::{Builder, EntryType, Header};
use thiserror::Error;

use crate::io::mode::{has_privileged_bits, standardise_mode};
use crate::io::modified_secs;

const GZIP_LEVEL: u32 = 9;
const ZSTD_LEVEL: i32 = 19;

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Refusing to package {kind} at {}", path.display())]
    Unsupported { path: PathBuf, kind: &'static str },

    #[error("Refusing to package {}: mode {mode:o} has setuid, setgid or sticky bits", path.display())]
    PrivilegedMode { path: PathBuf, mode: u32 },
}

fn io_at(path: &Path) -> impl FnOnce(io::Error) -> PackageError + '_ {
    move |source| PackageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Container written around the tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zstd,
}

impl Compression {
    /// Pick the container from the output name. Unknown suffixes get
    /// `.tar.gz` appended.
    pub fn for_output(output: &Path) -> (PathBuf, Compression) {
        let name = output
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if name.ends_with(".tar") {
            (output.to_path_buf(), Compression::None)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            (output.to_path_buf(), Compression::Gzip)
        } else if name.ends_with(".tar.zst") {
            (output.to_path_buf(), Compression::Zstd)
        } else {
            let mut appended = output.as_os_str().to_owned();
            appended.push(".tar.gz");
            (PathBuf::from(appended), Compression::Gzip)
        }
    }
}

/// Package everything below `root` into `output` and return the path that
/// was actually written.
pub fn package(root: &Path, output: &Path, clamp: i64) -> Result<PathBuf, PackageError> {
    let (path, compression) = Compression::for_output(output);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_at(parent))?;
    }
    let file = BufWriter::new(File::create(&path).map_err(io_at(&path))?);

    match compression {
        Compression::None => {
            let mut inner = write_tar(root, file, clamp)?;
            inner.flush().map_err(io_at(&path))?;
        }
        Compression::Gzip => {
            let encoder = GzBuilder::new()
                .mtime(u32::try_from(clamp.max(0)).unwrap_or(u32::MAX))
                .write(file, flate2::Compression::new(GZIP_LEVEL));
            let encoder = write_tar(root, encoder, clamp)?;
            encoder
                .finish()
                .and_then(|mut f| f.flush())
                .map_err(io_at(&path))?;
        }
        Compression::Zstd => {
            let encoder = zstd::stream::write::Encoder::new(file, ZSTD_LEVEL).map_err(io_at(&path))?;
            let encoder = write_tar(root, encoder, clamp)?;
            encoder
                .finish()
                .and_then(|mut f| f.flush())
                .map_err(io_at(&path))?;
        }
    }

    tracing::info!("Packaged {} ({compression:?})", path.display());
    Ok(path)
}

fn write_tar<W: Write>(root: &Path, writer: W, clamp: i64) -> Result<W, PackageError> {
    let mut builder = Builder::new(writer);
    append_children(&mut builder, root, Path::new(""), clamp)?;
    builder.into_inner().map_err(io_at(root))
}

fn append_children<W: Write>(
    builder: &mut Builder<W>,
    dir: &Path,
    prefix: &Path,
    clamp: i64,
) -> Result<(), PackageError> {
    let mut children = fs::read_dir(dir)
        .map_err(io_at(dir))?
        .map(|entry| entry.map(|e| e.file_name()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_at(dir))?;
    children.sort();

    for name in children {
        let path = dir.join(&name);
        let archive_path = prefix.join(&name);
        let meta = fs::symlink_metadata(&path).map_err(io_at(&path))?;
        let file_type = meta.file_type();

        let kind = if file_type.is_dir() {
            EntryType::Directory
        } else if file_type.is_file() {
            EntryType::Regular
        } else if file_type.is_symlink() {
            return Err(PackageError::Unsupported { path, kind: "symlink" });
        } else {
            return Err(PackageError::Unsupported {
                path,
                kind: "special file",
            });
        };

        let raw_mode = permission_bits(&meta);
        if has_privileged_bits(raw_mode) {
            return Err(PackageError::PrivilegedMode {
                path,
                mode: raw_mode,
            });
        }

        let mut header = Header::new_gnu();
        header.set_entry_type(kind);
        header.set_mode(standardise_mode(raw_mode, kind.is_dir()));
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(clamp_mtime(&meta, clamp));

        if kind.is_dir() {
            header.set_size(0);
            builder
                .append_data(&mut header, &archive_path, io::empty())
                .map_err(io_at(&path))?;
            append_children(builder, &path, &archive_path, clamp)?;
        } else {
            header.set_size(meta.len());
            let file = File::open(&path).map_err(io_at(&path))?;
            builder
                .append_data(&mut header, &archive_path, file)
                .map_err(io_at(&path))?;
        }
    }
    Ok(())
}

fn clamp_mtime(meta: &fs::Metadata, clamp: i64) -> u64 {
    modified_secs(meta).min(clamp).max(0) as u64
}

#[cfg(unix)]
fn permission_bits(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(meta: &fs::Metadata) -> u32 {
    if meta.is_dir() { 0o755 } else { 0o644 }
}
