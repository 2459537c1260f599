//! Read-access check for random device nodes.
//!
//! `/dev/hwrng` is normally `0600 root` or `0660 root:rng`. A node the
//! process cannot read is still reported by the kernel, so it is checked
//! up front rather than failing later at `open`.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use bitsource_core::models::error::SourceError;

/// Check whether the calling process may read `node`.
///
/// Returns `Ok(false)` when the node is missing or not readable.
pub fn check_device_access(node: &Path) -> Result<bool, SourceError> {
    let c_path = CString::new(node.as_os_str().as_bytes()).map_err(|_| {
        SourceError::ProbeFailed(format!("device path contains NUL: {}", node.display()))
    })?;

    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
    let rc = unsafe { libc::access(c_path.as_ptr(), libc::R_OK) };
    if rc == 0 {
        return Ok(true);
    }

    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ENOENT) | Some(libc::ENOTDIR) => Ok(false),
        Some(libc::EACCES) | Some(libc::EPERM) => {
            log::warn!("no read access to {}", node.display());
            Ok(false)
        }
        _ => {
            log::warn!("unexpected error checking {}: {}", node.display(), err);
            Ok(false)
        }
    }
}
