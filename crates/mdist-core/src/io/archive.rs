//! Format-agnostic walk over archive members.
//!
//! Zip, tar and gzip-compressed tar payloads are told apart by their magic
//! bytes and presented through one visitor so that root detection and
//! extraction do not care which container a source shipped.

use std::io::{Cursor, Read};

use flate2::read::GzDecoder;
use zip::ZipArchive;

use super::extract::ExtractError;

const ZIP_MAGIC: [u8; 2] = *b"PK";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const TAR_MAGIC_OFFSET: usize = 257;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
}

impl ArchiveFormat {
    /// Sniff the container format from the leading bytes.
    pub fn detect(data: &[u8]) -> Result<Self, ExtractError> {
        if data.starts_with(&ZIP_MAGIC) {
            Ok(Self::Zip)
        } else if data.starts_with(&GZIP_MAGIC) {
            Ok(Self::TarGz)
        } else if data
            .get(TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 5)
            .is_some_and(|magic| magic == b"ustar")
        {
            Ok(Self::Tar)
        } else {
            Err(ExtractError::UnknownFormat)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Directory,
    File,
    /// Links, devices and other entries that are never extracted.
    Unsupported(&'static str),
}

/// Metadata of one archive member, as stored.
#[derive(Debug, Clone)]
pub struct Member {
    pub name: String,
    pub kind: MemberKind,
    pub mode: u32,
    /// Seconds since the epoch; zip timestamps are read as UTC.
    pub mtime: Option<i64>,
}

/// Call `visit` for every member, in archive order, with a reader over its
/// contents.
pub fn for_each_member<F>(data: &[u8], mut visit: F) -> Result<(), ExtractError>
where
    F: FnMut(&Member, &mut dyn Read) -> Result<(), ExtractError>,
{
    match ArchiveFormat::detect(data)? {
        ArchiveFormat::Zip => walk_zip(data, &mut visit),
        ArchiveFormat::Tar => walk_tar(data, &mut visit),
        ArchiveFormat::TarGz => walk_tar(GzDecoder::new(data), &mut visit),
    }
}

/// Names of every member, in archive order.
pub fn member_names(data: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut names = Vec::new();
    for_each_member(data, |member, _| {
        names.push(member.name.clone());
        Ok(())
    })?;
    Ok(names)
}

/// The commit id `git archive` records in the pax global header of a tar
/// export, if present.
pub fn tar_commit_id(data: &[u8]) -> Result<Option<String>, ExtractError> {
    let mut archive = tar::Archive::new(data);
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_pax_global_extensions() {
            continue;
        }
        let Some(extensions) = entry.pax_extensions()? else {
            continue;
        };
        for extension in extensions {
            let extension = extension?;
            if extension.key() != Ok("comment") {
                continue;
            }
            if let Ok(value) = extension.value() {
                return Ok(Some(value.trim().to_string()));
            }
        }
    }
    Ok(None)
}

fn walk_zip<F>(data: &[u8], visit: &mut F) -> Result<(), ExtractError>
where
    F: FnMut(&Member, &mut dyn Read) -> Result<(), ExtractError>,
{
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let kind = if file.is_dir() {
            MemberKind::Directory
        } else if file.is_symlink() {
            MemberKind::Unsupported("symlink")
        } else {
            MemberKind::File
        };
        let member = Member {
            name: file.name().to_string(),
            kind,
            mode: file.unix_mode().unwrap_or(0o644),
            mtime: file.last_modified().and_then(zip_timestamp),
        };
        visit(&member, &mut file)?;
    }
    Ok(())
}

fn walk_tar<R: Read, F>(reader: R, visit: &mut F) -> Result<(), ExtractError>
where
    F: FnMut(&Member, &mut dyn Read) -> Result<(), ExtractError>,
{
    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let header = entry.header();
        let entry_type = header.entry_type();
        if entry_type.is_pax_global_extensions() {
            continue;
        }
        let kind = if entry_type.is_dir() {
            MemberKind::Directory
        } else if entry_type.is_file() {
            MemberKind::File
        } else if entry_type.is_symlink() {
            MemberKind::Unsupported("symlink")
        } else if entry_type.is_hard_link() {
            MemberKind::Unsupported("hard link")
        } else {
            MemberKind::Unsupported("special file")
        };
        let member = Member {
            name: String::from_utf8_lossy(&entry.path_bytes()).into_owned(),
            kind,
            mode: header.mode().unwrap_or(0o644),
            mtime: header.mtime().ok().map(|t| t as i64),
        };
        visit(&member, &mut entry)?;
    }
    Ok(())
}

fn zip_timestamp(dt: zip::DateTime) -> Option<i64> {
    let date = chrono::NaiveDate::from_ymd_opt(
        i32::from(dt.year()),
        u32::from(dt.month()),
        u32::from(dt.day()),
    )?;
    let time = date.and_hms_opt(
        u32::from(dt.hour()),
        u32::from(dt.minute()),
        u32::from(dt.second()),
    )?;
    Some(time.and_utc().timestamp())
}
