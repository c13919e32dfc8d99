// mirrormediad/src/resolver.rs

//! Maps the caller-visible logical roots onto their real filesystem trees.
//! Pure string work, no filesystem access.

use std::path::PathBuf;

use anyhow::{Result, bail};

use crate::defs;
use crate::paths;

/// A recognized logical root, resolved to where the tree actually lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub real_root: PathBuf,
    pub rel_base: String,
    /// True for trees under the emulated external storage, which take the
    /// setgid + ext_data_rw ownership policy on restore.
    pub external: bool,
}

impl Resolved {
    /// The directory all producers and consumers operate on.
    pub fn base_dir(&self) -> PathBuf {
        if self.rel_base.is_empty() {
            self.real_root.clone()
        } else {
            paths::join_rel(&self.real_root, &self.rel_base)
        }
    }
}

/// Accepts exactly four forms: the two logical roots, bare or with a tail.
/// Anything else is rejected.
pub fn resolve(logical: &str) -> Result<Resolved> {
    let (real_root, rel_base, external) = if logical == defs::LOG_DATA_ROOT {
        (defs::REAL_DATA_ROOT, "", false)
    } else if let Some(tail) = strip_rooted_prefix(logical, defs::LOG_DATA_ROOT) {
        (defs::REAL_DATA_ROOT, tail, false)
    } else if logical == defs::LOG_EXT_ROOT {
        (defs::REAL_EXT_ROOT, "", true)
    } else if let Some(tail) = strip_rooted_prefix(logical, defs::LOG_EXT_ROOT) {
        (defs::REAL_EXT_ROOT, tail, true)
    } else {
        bail!("unsupported logical root: {logical:?}");
    };

    Ok(Resolved {
        real_root: PathBuf::from(real_root),
        // Trailing separators would otherwise survive into every joined path.
        rel_base: rel_base.trim_end_matches('/').to_string(),
        external,
    })
}

fn strip_rooted_prefix<'a>(logical: &'a str, root: &str) -> Option<&'a str> {
    logical
        .strip_prefix(root)
        .and_then(|rest| rest.strip_prefix('/'))
}
