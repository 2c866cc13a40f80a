//! Error codes and exit status for armoryctl
//!
//! Library failures carry an `ErrorKind`; the exit code comes from it.
//! Anything else (argument or terminal problems) is a general error.

use armory_common::{ArmoryError, ErrorKind};

/// Exit code for success
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for general errors
pub const EXIT_GENERAL_ERROR: i32 = 1;

/// First `ArmoryError` in the chain, looking through `.context()` layers
pub fn armory_error(err: &anyhow::Error) -> Option<&ArmoryError> {
    err.chain().find_map(|e| e.downcast_ref::<ArmoryError>())
}

pub fn exit_code(err: &anyhow::Error) -> i32 {
    armory_error(err)
        .map(|e| e.kind().exit_code())
        .unwrap_or(EXIT_GENERAL_ERROR)
}

/// Follow-up advice printed under the error
pub fn hint(err: &anyhow::Error) -> Option<&'static str> {
    match armory_error(err)?.kind() {
        ErrorKind::Concurrency => {
            Some("another armoryctl invocation holds the lock; re-run when it has finished")
        }
        ErrorKind::Precondition => Some("enable the curated source first: armoryctl repo enable"),
        ErrorKind::Trust => Some("the manifest was rejected and the cache left as it was"),
        ErrorKind::Reversibility => {
            Some("the repository backup is missing or unusable; inspect it before editing the sources file by hand")
        }
        _ => None,
    }
}
