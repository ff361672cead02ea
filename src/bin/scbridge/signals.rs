use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};

/// Set by the SIGINT/SIGTERM handler; the main loop polls it.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Only touches an atomic, which is async-signal-safe.
extern "C" fn handle_shutdown_signal(_: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

pub(crate) fn install_shutdown_handlers() -> Result<()> {
    for signo in [libc::SIGINT, libc::SIGTERM] {
        unsafe {
            // SAFETY: the handler only stores to a static atomic.
            let handler = handle_shutdown_signal as *const () as libc::sighandler_t;
            if libc::signal(signo, handler) == libc::SIG_ERR {
                return Err(anyhow!("failed to install handler for signal {signo}"));
            }
        }
    }
    Ok(())
}

pub(crate) fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}
