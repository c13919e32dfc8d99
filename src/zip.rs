// mirrormediad/src/zip.rs

//! The compressed container pipeline. Dumps stage a deflate ZIP in the
//! daemon-private staging directory and then copy it to the descriptor;
//! restores spool the descriptor to a staging file (the format is read by
//! seeking from the end), scan the central directory for entry names, and
//! extract each one with ownership and label fixups.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, Write};
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::Path;

use anyhow::{Context, Result, bail};
use tempfile::Builder as TempBuilder;
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::read::ZipArchive;
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::defs;
use crate::paths;
use crate::resolver;
use crate::utils;
use crate::wire;

const EOCD_SIG: u32 = 0x0605_4b50;
const CEN_SIG: u32 = 0x0201_4b50;
const EOCD_LEN: usize = 22;
const CEN_LEN: u64 = 46;
// EOCD may be followed by a comment of at most 64 KiB.
const EOCD_SEARCH_MAX: u64 = 0x10000 + EOCD_LEN as u64;

/// Streams a ZIP of the tree behind `logical` to `out`.
pub fn dump<W: Write>(logical: &str, staging_dir: &Path, out: &mut W) -> Result<()> {
    let resolved = resolver::resolve(logical)?;
    let base = resolved.base_dir();
    log::info!("zip dump: logical={} base={}", logical, base.display());
    zip_tree(&base, staging_dir, out)
}

pub(crate) fn zip_tree<W: Write>(base: &Path, staging_dir: &Path, out: &mut W) -> Result<()> {
    paths::ensure_dir_all(staging_dir, 0o770)?;
    let staging = TempBuilder::new()
        .prefix("mm_zip.")
        .tempfile_in(staging_dir)
        .context("creating zip staging file")?;
    log::debug!("zip dump: staging file {}", staging.path().display());

    let mut writer = ZipWriter::new(staging.reopen()?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(base).min_depth(1).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("zip dump: skipping unreadable entry: {e}");
                continue;
            }
        };
        let rel = entry
            .path()
            .strip_prefix(base)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .into_owned();

        let file_type = entry.file_type();
        if file_type.is_dir() {
            writer.add_directory(rel, options)?;
        } else if file_type.is_file() {
            // Source files that cannot be opened are tolerated so a
            // best-effort backup still completes.
            let mut source = match OpenOptions::new()
                .read(true)
                .custom_flags(libc::O_NOFOLLOW | libc::O_CLOEXEC)
                .open(entry.path())
            {
                Ok(source) => source,
                Err(e) => {
                    log::warn!("zip dump: open {} failed: {e}", entry.path().display());
                    continue;
                }
            };
            writer.start_file(rel, options)?;
            io::copy(&mut source, &mut writer)
                .with_context(|| format!("zip dump: archiving {}", entry.path().display()))?;
        }
    }

    let mut finished = writer.finish().context("zip dump: finalizing archive")?;
    finished.rewind()?;
    let sent = wire::copy_to_eof(&mut finished, out).context("zip dump: copying to descriptor")?;
    log::info!("zip dump: sent {sent} bytes");
    Ok(())
}

/// Consumes a ZIP from `input` and materializes it under the tree behind
/// `logical`, owned by `uid`.
pub fn restore<R: Read>(input: &mut R, logical: &str, uid: u32, staging_dir: &Path) -> Result<()> {
    let resolved = resolver::resolve(logical)?;
    let base = resolved.base_dir();
    log::info!("zip restore: logical={} base={} uid={}", logical, base.display(), uid);
    extract_archive(input, &base, uid, staging_dir)
}

pub(crate) fn extract_archive<R: Read>(
    input: &mut R,
    base: &Path,
    uid: u32,
    staging_dir: &Path,
) -> Result<()> {
    paths::ensure_dir_all(base, 0o770)?;
    paths::ensure_dir_all(staging_dir, 0o770)?;

    let mut staging = TempBuilder::new()
        .prefix("mm_inzip.")
        .tempfile_in(staging_dir)
        .context("creating zip staging file")?;
    let received = wire::copy_to_eof(input, staging.as_file_mut())
        .context("zip restore: spooling input")?;
    staging.as_file_mut().sync_all()?;
    log::info!("zip restore: staged {received} bytes");

    let names = list_entry_names(staging.as_file())?;
    let mut archive = ZipArchive::new(staging.reopen()?).context("zip restore: opening archive")?;

    let (mut files, mut bytes, mut failed) = (0u64, 0u64, 0u64);

    for name in &names {
        let rel = match paths::sanitize_rel(name) {
            Ok(rel) => rel,
            Err(e) => {
                log::warn!("zip restore: skipping suspicious entry: {e:#}");
                failed += 1;
                continue;
            }
        };

        if rel.ends_with('/') {
            let out_dir = paths::join_rel(base, &rel);
            if let Err(e) = paths::ensure_dir_all(&out_dir, 0o770) {
                log::warn!("zip restore: {e:#}");
                failed += 1;
                continue;
            }
            utils::apply_owner_mode(&out_dir, uid, uid, 0o770);
            utils::restorecon(&out_dir);
            continue;
        }

        let out_path = paths::join_rel(base, &rel);
        if let Err(e) = paths::ensure_dir_all(paths::parent_of(&out_path), 0o770) {
            log::warn!("zip restore: {e:#}");
            failed += 1;
            continue;
        }

        let mut entry = match archive.by_name(name) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("zip restore: lookup {name:?} failed: {e}");
                failed += 1;
                continue;
            }
        };

        let mut file = match OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .custom_flags(libc::O_NOFOLLOW | libc::O_CLOEXEC)
            .mode(0o600)
            .open(&out_path)
        {
            Ok(file) => file,
            Err(e) => {
                log::warn!("zip restore: open {} failed: {e}", out_path.display());
                failed += 1;
                continue;
            }
        };

        match io::copy(&mut entry, &mut file) {
            Ok(n) => {
                if let Err(e) = utils::fchown_file(&file, uid, uid) {
                    log::warn!("zip restore: {} {e:#}", out_path.display());
                }
                if let Err(e) = utils::fchmod_file(&file, 0o600) {
                    log::warn!("zip restore: {} {e:#}", out_path.display());
                }
                utils::restorecon(&out_path);
                files += 1;
                bytes += n;
            }
            Err(e) => {
                log::warn!("zip restore: extract {} failed: {e}", out_path.display());
                failed += 1;
            }
        }
    }

    log::info!("zip restore: done files={files} bytes={bytes} failed={failed}");
    if failed > 0 {
        bail!("zip restore: {failed} entries failed");
    }
    Ok(())
}

fn rd_u16(buf: &[u8], off: usize) -> u16 {
    u16::from(buf[off]) | u16::from(buf[off + 1]) << 8
}

fn rd_u32(buf: &[u8], off: usize) -> u32 {
    u32::from(buf[off])
        | u32::from(buf[off + 1]) << 8
        | u32::from(buf[off + 2]) << 16
        | u32::from(buf[off + 3]) << 24
}

/// Locates the end-of-central-directory record by scanning backward through
/// the final bytes of the archive, then walks the central directory and
/// returns every entry name in order. ZIP32 only.
pub(crate) fn list_entry_names(file: &File) -> Result<Vec<String>> {
    let size = file.metadata()?.len();
    if size < EOCD_LEN as u64 {
        bail!("zip too small ({size} bytes)");
    }

    let tail_len = size.min(EOCD_SEARCH_MAX) as usize;
    let mut tail = vec![0u8; tail_len];
    file.read_exact_at(&mut tail, size - tail_len as u64)?;

    let mut eocd_at = None;
    for i in (0..=tail_len - EOCD_LEN).rev() {
        if rd_u32(&tail, i) == EOCD_SIG {
            eocd_at = Some(i);
            break;
        }
    }
    let Some(eocd_at) = eocd_at else {
        bail!("end-of-central-directory record not found");
    };
    let eocd = &tail[eocd_at..eocd_at + EOCD_LEN];

    let entry_count = rd_u16(eocd, 10) as usize;
    let cd_size = u64::from(rd_u32(eocd, 12));
    let cd_offset = u64::from(rd_u32(eocd, 16));
    if cd_offset + cd_size > size {
        bail!("central directory out of range");
    }

    let mut names = Vec::with_capacity(entry_count.min(defs::ZIP_MAX_ENTRIES));
    let mut pos = cd_offset;
    let end = cd_offset + cd_size;
    let mut parsed = 0usize;

    while pos < end {
        let mut header = [0u8; CEN_LEN as usize];
        file.read_exact_at(&mut header, pos)
            .context("truncated central directory")?;
        if rd_u32(&header, 0) != CEN_SIG {
            bail!("bad central-directory signature at offset {pos}");
        }

        let name_len = rd_u16(&header, 28) as usize;
        let extra_len = rd_u16(&header, 30) as u64;
        let comment_len = rd_u16(&header, 32) as u64;

        let mut name = vec![0u8; name_len];
        if name_len > 0 {
            file.read_exact_at(&mut name, pos + CEN_LEN)
                .context("truncated entry name")?;
        }
        names.push(String::from_utf8_lossy(&name).into_owned());

        pos += CEN_LEN + name_len as u64 + extra_len + comment_len;
        parsed += 1;
        if parsed > defs::ZIP_MAX_ENTRIES {
            bail!("too many central-directory entries");
        }
    }

    log::debug!("zip restore: {} entries listed", names.len());
    Ok(names)
}
