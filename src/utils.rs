// Copyright 2026 MirrorMedia Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::ffi::CString;
use std::fs::{self, File, Permissions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;

use anyhow::{Result, bail};

pub fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(level)
                .with_tag("mirrormediad"),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        use std::io::Write;

        let mut builder = env_logger::Builder::new();
        builder.format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        });
        builder.filter_level(level).init();
    }
    Ok(())
}

pub fn chown_path(path: &Path, uid: u32, gid: u32) -> Result<()> {
    let c_path = CString::new(path.as_os_str().as_encoded_bytes())?;
    let rc = unsafe { libc::chown(c_path.as_ptr(), uid, gid) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        bail!("chown {} failed: {}", path.display(), err);
    }
    Ok(())
}

pub fn fchown_file(file: &File, uid: u32, gid: u32) -> Result<()> {
    let rc = unsafe { libc::fchown(file.as_raw_fd(), uid, gid) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        bail!("fchown failed: {}", err);
    }
    Ok(())
}

pub fn chmod_path(path: &Path, mode: u32) -> Result<()> {
    fs::set_permissions(path, Permissions::from_mode(mode))?;
    Ok(())
}

pub fn fchmod_file(file: &File, mode: u32) -> Result<()> {
    file.set_permissions(Permissions::from_mode(mode))?;
    Ok(())
}

/// Applies ownership and mode to a restored object, logging failures instead
/// of propagating them; the tree may still be usable without the fixup.
pub fn apply_owner_mode(path: &Path, uid: u32, gid: u32, mode: u32) {
    if let Err(e) = chown_path(path, uid, gid) {
        log::warn!("{e:#}");
    }
    if let Err(e) = chmod_path(path, mode) {
        log::warn!("chmod {} failed: {e:#}", path.display());
    }
}

/// Restores the SELinux label of a path. The label database lives outside the
/// daemon, so this invokes the system `restorecon` tool; failure is logged and
/// never fatal.
pub fn restorecon(path: &Path) {
    match Command::new("restorecon").arg(path).status() {
        Ok(status) if status.success() => {}
        Ok(status) => log::warn!("restorecon {} exited with {}", path.display(), status),
        Err(e) => log::warn!("restorecon {} failed to spawn: {}", path.display(), e),
    }
}
