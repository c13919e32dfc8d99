// mirrormediad/src/defs.rs

// Daemon constants

// Abstract socket name (bound with a leading NUL, no filesystem node).
pub const SOCKET_NAME: &str = "mirrormediad";

// Pending connections kept by the kernel while we serve one request.
pub const SOCKET_BACKLOG: i32 = 4;

// Daemon-private staging area for seekable intermediates.
pub const STAGING_DIR: &str = "/data/system/mirrormedia";

// Logical roots accepted from clients and the trees they map to.
pub const LOG_DATA_ROOT: &str = "/data/data";
pub const REAL_DATA_ROOT: &str = "/data/user/0";
pub const LOG_EXT_ROOT: &str = "/sdcard/Android/data";
pub const REAL_EXT_ROOT: &str = "/data/media/0/Android/data";

// Fixed Android ids (private/android_filesystem_config.h).
pub const AID_EXT_DATA_RW: u32 = 1078;
pub const AID_RADIO: u32 = 1001;

// SMS DB paths (Android 11+ user DE storage).
pub const SMS_DB_PATH: &str = "/data/user/0/com.android.providers.telephony/databases/mmssms.db";
pub const SMS_DB_DIR: &str = "/data/user/0/com.android.providers.telephony/databases";
pub const SMS_DB_WAL: &str = "/data/user/0/com.android.providers.telephony/databases/mmssms.db-wal";
pub const SMS_DB_SHM: &str = "/data/user/0/com.android.providers.telephony/databases/mmssms.db-shm";

// Upper bound on central-directory entries accepted from a client archive.
pub const ZIP_MAX_ENTRIES: usize = 100_000;
