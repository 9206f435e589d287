//! Termination signal plumbing.
//!
//! Handlers only record the signal in an atomic flag; the pipelines poll
//! it between blocks, so a pool/index append pair is never split by a
//! termination. See `imagepile_image::Interruption`.

use std::sync::atomic::{AtomicBool, Ordering};

use imagepile_image::Interruption;

static TERMINATED: AtomicBool = AtomicBool::new(false);

/// View of the process-wide termination flag for the pipelines.
pub struct TerminationFlag;

impl Interruption for TerminationFlag {
    fn interrupted(&self) -> bool {
        TERMINATED.load(Ordering::Relaxed)
    }
}

#[cfg(unix)]
extern "C" fn record_termination(_signal: libc::c_int) {
    TERMINATED.store(true, Ordering::Relaxed);
}

/// Install handlers for the termination signals and restore default
/// SIGPIPE behavior (a closed stdout should end the process quietly).
#[cfg(unix)]
pub fn install() -> std::io::Result<()> {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        for sig in [libc::SIGINT, libc::SIGTERM, libc::SIGHUP, libc::SIGABRT] {
            let handler = record_termination as extern "C" fn(libc::c_int);
            if libc::signal(sig, handler as usize) == libc::SIG_ERR {
                return Err(std::io::Error::last_os_error());
            }
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn install() -> std::io::Result<()> {
    Ok(())
}
