// mirrormediad/src/raw.rs

//! The uncompressed archive stream: magic `MM01`, then tagged records
//! (`D` directory, `F` file with payload, `E` end), all integers
//! little-endian. Payload length precedes the payload, so neither side needs
//! a seekable descriptor.

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;

use anyhow::{Context, Result, bail};
use walkdir::WalkDir;

use crate::defs;
use crate::paths;
use crate::resolver;
use crate::utils;
use crate::wire::{self, WireRead, WireWrite};

pub const MAGIC: &[u8; 4] = b"MM01";

const TAG_DIR: u8 = b'D';
const TAG_FILE: u8 = b'F';
const TAG_END: u8 = b'E';

// Directory records always advertise this mode; the consumer applies its own
// policy anyway.
const DIR_RECORD_MODE: u32 = 0o770;

fn write_record<W: Write>(
    out: &mut W,
    tag: u8,
    rel: &str,
    mode: u32,
    mtime: u64,
    size: u64,
) -> Result<()> {
    out.write_u8(tag)?;
    out.write_u16_le(rel.len() as u16)?;
    out.write_u32_le(mode)?;
    out.write_u64_le(mtime)?;
    out.write_u64_le(size)?;
    out.write_all(rel.as_bytes())?;
    Ok(())
}

/// Streams the tree behind `logical` to `out` as an MM01 archive.
pub fn dump<W: Write>(logical: &str, out: &mut W) -> Result<()> {
    let resolved = resolver::resolve(logical)?;
    let base = resolved.base_dir();
    log::info!("raw dump: logical={} base={}", logical, base.display());
    dump_tree(&base, out)
}

pub(crate) fn dump_tree<W: Write>(base: &Path, out: &mut W) -> Result<()> {
    out.write_all(MAGIC)?;

    for entry in WalkDir::new(base).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("raw dump: skipping unreadable entry: {e}");
                continue;
            }
        };

        let rel = entry
            .path()
            .strip_prefix(base)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .into_owned();
        if rel.len() > u16::MAX as usize {
            log::warn!("raw dump: path too long, skipping: {rel}");
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            write_record(out, TAG_DIR, &rel, DIR_RECORD_MODE, 0, 0)?;
        } else if file_type.is_file() {
            send_file(out, entry.path(), &rel)?;
        }
        // Symlinks, devices, fifos and sockets are dropped.
    }

    write_record(out, TAG_END, "", 0, 0, 0)?;
    Ok(())
}

fn send_file<W: Write>(out: &mut W, full: &Path, rel: &str) -> Result<()> {
    let meta = match full.symlink_metadata() {
        Ok(meta) => meta,
        Err(e) => {
            log::warn!("raw dump: stat {} failed: {e}", full.display());
            return Ok(());
        }
    };

    let mut file = match OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOFOLLOW | libc::O_CLOEXEC)
        .open(full)
    {
        Ok(file) => file,
        Err(e) => {
            log::warn!("raw dump: open {} failed: {e}", full.display());
            return Ok(());
        }
    };

    let size = meta.len();
    write_record(
        out,
        TAG_FILE,
        rel,
        meta.permissions().mode() & 0o777,
        meta.mtime() as u64,
        size,
    )?;
    // The header already promised `size` bytes; a short source read would
    // desynchronize the stream, so it aborts the dump.
    wire::copy_exact(&mut file, out, size)
        .with_context(|| format!("raw dump: streaming {}", full.display()))
}

fn dir_mode(external: bool, rel: &str) -> u32 {
    if external {
        if rel.is_empty() { 0o2770 } else { 0o2700 }
    } else {
        0o700
    }
}

/// Materializes an MM01 stream under the tree behind `logical`, owning every
/// restored object as `uid` (group `ext_data_rw` for external trees).
pub fn restore<R: Read>(input: &mut R, logical: &str, uid: u32) -> Result<()> {
    let resolved = resolver::resolve(logical)?;
    let gid = if resolved.external {
        defs::AID_EXT_DATA_RW
    } else {
        uid
    };
    let base = resolved.base_dir();
    log::info!(
        "raw restore: logical={} base={} uid={} gid={} external={}",
        logical,
        base.display(),
        uid,
        gid,
        resolved.external
    );
    restore_tree(input, &base, resolved.external, uid, gid)
}

pub(crate) fn restore_tree<R: Read>(
    input: &mut R,
    base: &Path,
    external: bool,
    uid: u32,
    gid: u32,
) -> Result<()> {
    paths::ensure_dir_all(base, 0o700)?;

    let mut magic = [0u8; 4];
    input
        .read_exact(&mut magic)
        .context("raw restore: reading stream magic")?;
    if &magic != MAGIC {
        bail!("raw restore: bad stream magic {magic:02x?}");
    }

    let (mut dirs, mut files, mut bytes, mut failed) = (0u64, 0u64, 0u64, 0u64);

    loop {
        let tag = input.read_u8().context("raw restore: reading record tag")?;
        if tag == TAG_END {
            // Numeric fields of the end record are present but meaningless.
            let _ = input.read_u16_le()?;
            let _ = input.read_u32_le()?;
            let _ = input.read_u64_le()?;
            let _ = input.read_u64_le()?;
            break;
        }
        if tag != TAG_DIR && tag != TAG_FILE {
            bail!("raw restore: unknown record tag {tag:#04x}");
        }

        let path_len = input.read_u16_le()?;
        let mode = input.read_u32_le()?;
        let _mtime = input.read_u64_le()?;
        let size = input.read_u64_le()?;

        let mut raw_path = vec![0u8; path_len as usize];
        input
            .read_exact(&mut raw_path)
            .context("raw restore: reading entry path")?;

        let rel = match std::str::from_utf8(&raw_path)
            .map_err(anyhow::Error::from)
            .and_then(|s| paths::sanitize_rel(s))
        {
            Ok(rel) => rel,
            Err(e) => {
                log::warn!("raw restore: skipping suspicious entry: {e:#}");
                if tag == TAG_FILE {
                    wire::drain_exact(input, size)?;
                }
                failed += 1;
                continue;
            }
        };

        if tag == TAG_DIR {
            let out_path = paths::join_rel(base, &rel);
            let mode_d = dir_mode(external, &rel);
            if let Err(e) = paths::ensure_dir_all(&out_path, mode_d) {
                log::warn!("raw restore: {e:#}");
                failed += 1;
                continue;
            }
            utils::apply_owner_mode(&out_path, uid, gid, mode_d);
            utils::restorecon(&out_path);
            log::debug!("raw restore: D {} mode={:o}", out_path.display(), mode_d);
            dirs += 1;
        } else {
            let file_mode = if mode & 0o777 != 0 { mode & 0o777 } else { 0o600 };
            let out_path = paths::join_rel(base, &rel);

            let parent = paths::parent_of(&out_path).to_path_buf();
            let parent_mode = if parent == base {
                dir_mode(external, "")
            } else {
                dir_mode(external, &rel)
            };
            if let Err(e) = paths::ensure_dir_all(&parent, parent_mode) {
                log::warn!("raw restore: {e:#}");
                wire::drain_exact(input, size)?;
                failed += 1;
                continue;
            }
            utils::apply_owner_mode(&parent, uid, gid, parent_mode);

            let mut file = match OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .custom_flags(libc::O_NOFOLLOW | libc::O_CLOEXEC)
                .mode(file_mode)
                .open(&out_path)
            {
                Ok(file) => file,
                Err(e) => {
                    log::warn!("raw restore: open {} failed: {e}", out_path.display());
                    wire::drain_exact(input, size)?;
                    failed += 1;
                    continue;
                }
            };

            // A shortfall inside a declared payload loses stream alignment,
            // so it aborts the whole restore.
            wire::copy_exact(input, &mut file, size)
                .with_context(|| format!("raw restore: payload of {}", out_path.display()))?;

            if let Err(e) = utils::fchown_file(&file, uid, gid) {
                log::warn!("raw restore: {} {e:#}", out_path.display());
            }
            if let Err(e) = utils::fchmod_file(&file, file_mode) {
                log::warn!("raw restore: {} {e:#}", out_path.display());
            }
            utils::restorecon(&out_path);
            log::debug!(
                "raw restore: F {} mode={:o} size={}",
                out_path.display(),
                file_mode,
                size
            );
            files += 1;
            bytes += size;
        }
    }

    log::info!("raw restore: done dirs={dirs} files={files} bytes={bytes} failed={failed}");
    if failed > 0 {
        bail!("raw restore: {failed} entries failed");
    }
    Ok(())
}
