//! Archive extraction module
//!
//! Unpacks zip and tar payloads into a staging directory, stripping the
//! locked extraction root and refusing anything that would land outside the
//! destination.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};

use thiserror::Error;

use super::archive::{self, MemberKind};
use super::mode::standardise_mode;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Archive read error: {0}")]
    Read(#[from] io::Error),

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unrecognized archive format (expected zip, tar or tar.gz)")]
    UnknownFormat,
}

fn io_at(path: &Path) -> impl FnOnce(io::Error) -> ExtractError + '_ {
    move |source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Extract `data` into `destination`, keeping only members under
/// `root_prefix` and stripping that prefix.
///
/// Members that would resolve outside `destination`, and links or special
/// files, are skipped with a warning. File modes are normalized and mtimes
/// restored from the archive. Returns the latest file mtime seen, if any.
pub fn extract(
    data: &[u8],
    destination: &Path,
    root_prefix: &str,
) -> Result<Option<i64>, ExtractError> {
    fs::create_dir_all(destination).map_err(io_at(destination))?;
    let canonical_destination = destination
        .canonicalize()
        .map_err(io_at(destination))?;

    let mut latest_mtime: Option<i64> = None;
    let mut written = 0usize;

    archive::for_each_member(data, |member, reader| {
        let name = member.name.trim_start_matches("./");
        let Some(relative) = name.strip_prefix(root_prefix) else {
            return Ok(());
        };
        if relative.is_empty() || relative == "/" {
            return Ok(());
        }

        let Some(target) = resolve_target(destination, &canonical_destination, relative) else {
            tracing::warn!(
                "Skipping potentially dangerous member '{}' (would be placed at '{relative}')",
                member.name
            );
            return Ok(());
        };

        match member.kind {
            MemberKind::Directory => {
                fs::create_dir_all(&target).map_err(io_at(&target))?;
            }
            MemberKind::Unsupported(what) => {
                tracing::warn!("Skipping {what} member '{}'", member.name);
            }
            MemberKind::File => {
                write_member(&target, reader, member.mode, member.mtime)?;
                if let Some(mtime) = member.mtime {
                    latest_mtime = Some(latest_mtime.map_or(mtime, |l| l.max(mtime)));
                }
                written += 1;
            }
        }
        Ok(())
    })?;

    tracing::debug!(
        "Extracted {written} files into {} (root '{root_prefix}')",
        destination.display()
    );
    Ok(latest_mtime)
}

/// Map an archive-relative name onto a path strictly below `destination`.
///
/// `..` components are resolved lexically and may not climb above the
/// destination; absolute names are refused. The deepest existing ancestor is
/// then canonicalized so a pre-existing symlink cannot redirect the write.
fn resolve_target(destination: &Path, canonical_destination: &Path, name: &str) -> Option<PathBuf> {
    let mut relative = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !relative.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if relative.as_os_str().is_empty() {
        return None;
    }

    let target = destination.join(&relative);
    let mut ancestor = target.parent();
    while let Some(dir) = ancestor {
        if dir.exists() {
            let resolved = dir.canonicalize().ok()?;
            return resolved
                .starts_with(canonical_destination)
                .then_some(target);
        }
        ancestor = dir.parent();
    }
    None
}

fn write_member(
    target: &Path,
    reader: &mut dyn Read,
    mode: u32,
    mtime: Option<i64>,
) -> Result<(), ExtractError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(io_at(parent))?;
    }
    let mut file = File::create(target).map_err(io_at(target))?;
    io::copy(reader, &mut file)?;

    set_mode(&file, standardise_mode(mode, false)).map_err(io_at(target))?;
    if let Some(mtime) = mtime {
        let secs = u64::try_from(mtime).unwrap_or(0);
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .map_err(io_at(target))?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(file: &File, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_file: &File, _mode: u32) -> io::Result<()> {
    Ok(())
}
