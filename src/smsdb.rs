// mirrormediad/src/smsdb.rs

//! Single-file pass-through for the telephony database. Backup is a plain
//! byte copy; restore writes a sibling temporary, drops the WAL/SHM files so
//! SQLite falls back to the main database, and renames atomically.

use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::defs;
use crate::paths;
use crate::utils;
use crate::wire;

pub struct DbPaths {
    pub primary: PathBuf,
    pub dir: PathBuf,
    pub wal: PathBuf,
    pub shm: PathBuf,
}

impl DbPaths {
    fn system() -> Self {
        Self {
            primary: PathBuf::from(defs::SMS_DB_PATH),
            dir: PathBuf::from(defs::SMS_DB_DIR),
            wal: PathBuf::from(defs::SMS_DB_WAL),
            shm: PathBuf::from(defs::SMS_DB_SHM),
        }
    }
}

pub fn backup<W: Write>(out: &mut W) -> Result<()> {
    backup_db(&DbPaths::system(), out)
}

pub(crate) fn backup_db<W: Write>(db: &DbPaths, out: &mut W) -> Result<()> {
    let mut file = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_CLOEXEC)
        .open(&db.primary)
        .with_context(|| format!("opening {}", db.primary.display()))?;
    let sent = wire::copy_to_eof(&mut file, out)?;
    log::info!("sms backup: streamed {sent} bytes");
    Ok(())
}

pub fn restore<R: Read>(input: &mut R) -> Result<()> {
    restore_db(&DbPaths::system(), (defs::AID_RADIO, defs::AID_RADIO), input)
}

pub(crate) fn restore_db<R: Read>(db: &DbPaths, owner: (u32, u32), input: &mut R) -> Result<()> {
    paths::ensure_dir_all(&db.dir, 0o771)?;

    let mut tmp_path = db.primary.clone().into_os_string();
    tmp_path.push(".tmp");
    let tmp_path = PathBuf::from(tmp_path);

    // Removes the temporary on any failure before the rename takes over.
    struct CleanupGuard<'a>(&'a Path);
    impl Drop for CleanupGuard<'_> {
        fn drop(&mut self) {
            let _ = fs::remove_file(self.0);
        }
    }
    let guard = CleanupGuard(&tmp_path);

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .custom_flags(libc::O_CLOEXEC | libc::O_NOFOLLOW)
            .mode(0o660)
            .open(&tmp_path)
            .with_context(|| format!("opening {}", tmp_path.display()))?;
        let received = wire::copy_to_eof(input, &mut file)?;
        file.sync_all()?;
        log::info!("sms restore: received {received} bytes");
    }

    // Stale WAL/SHM siblings would shadow the replaced database.
    let _ = fs::remove_file(&db.wal);
    let _ = fs::remove_file(&db.shm);

    fs::rename(&tmp_path, &db.primary)
        .with_context(|| format!("renaming over {}", db.primary.display()))?;
    std::mem::forget(guard);

    utils::chown_path(&db.primary, owner.0, owner.1)?;
    utils::chmod_path(&db.primary, 0o660)?;
    utils::restorecon(&db.primary);

    log::info!("sms restore: done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::os::unix::fs::MetadataExt;
    use tempfile::TempDir;

    fn temp_db(root: &Path) -> DbPaths {
        let dir = root.join("databases");
        DbPaths {
            primary: dir.join("mmssms.db"),
            wal: dir.join("mmssms.db-wal"),
            shm: dir.join("mmssms.db-shm"),
            dir,
        }
    }

    fn own_ids() -> (u32, u32) {
        unsafe { (libc::getuid(), libc::getgid()) }
    }

    #[test]
    fn test_backup_streams_bytes() {
        let root = TempDir::new().unwrap();
        let db = temp_db(root.path());
        fs::create_dir(&db.dir).unwrap();
        fs::write(&db.primary, b"sqlite bytes").unwrap();

        let mut out = Vec::new();
        backup_db(&db, &mut out).unwrap();
        assert_eq!(out, b"sqlite bytes");
    }

    #[test]
    fn test_backup_missing_db_fails() {
        let root = TempDir::new().unwrap();
        let db = temp_db(root.path());
        let mut out = Vec::new();
        assert!(backup_db(&db, &mut out).is_err());
    }

    #[test]
    fn test_restore_replaces_atomically() {
        let root = TempDir::new().unwrap();
        let db = temp_db(root.path());
        fs::create_dir(&db.dir).unwrap();
        fs::write(&db.primary, b"old").unwrap();
        fs::write(&db.wal, b"wal").unwrap();
        fs::write(&db.shm, b"shm").unwrap();

        let payload = vec![0x5Au8; 1024 * 1024];
        restore_db(&db, own_ids(), &mut &payload[..]).unwrap();

        assert_eq!(fs::read(&db.primary).unwrap(), payload);
        assert!(!db.wal.exists());
        assert!(!db.shm.exists());
        assert_eq!(fs::metadata(&db.primary).unwrap().mode() & 0o777, 0o660);
        // No leftover temporary.
        assert_eq!(
            fs::read_dir(&db.dir).unwrap().count(),
            1,
            "only the primary file remains"
        );
    }

    struct FailingReader {
        remaining: usize,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer gone"));
            }
            let n = buf.len().min(self.remaining);
            self.remaining -= n;
            buf[..n].fill(0x11);
            Ok(n)
        }
    }

    #[test]
    fn test_restore_failure_removes_temporary() {
        let root = TempDir::new().unwrap();
        let db = temp_db(root.path());
        fs::create_dir(&db.dir).unwrap();
        fs::write(&db.primary, b"old").unwrap();

        let mut input = FailingReader { remaining: 4096 };
        assert!(restore_db(&db, own_ids(), &mut input).is_err());

        // Old database intact, temporary cleaned up.
        assert_eq!(fs::read(&db.primary).unwrap(), b"old");
        assert_eq!(fs::read_dir(&db.dir).unwrap().count(), 1);
    }
}
