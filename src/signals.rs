//! SIGINT/SIGTERM capture for controlled shutdown.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use crate::error::{EngineError, Result};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static LAST_SIGNAL: AtomicI32 = AtomicI32::new(0);

extern "C" fn on_signal(signal: libc::c_int) {
    // Only async-signal-safe work here: two atomic stores.
    LAST_SIGNAL.store(signal, Ordering::SeqCst);
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Route SIGINT and SIGTERM into the interrupt flag.
#[cfg(unix)]
pub fn install() -> Result<()> {
    let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    for signal in [libc::SIGINT, libc::SIGTERM] {
        let previous = unsafe { libc::signal(signal, handler) };
        if previous == libc::SIG_ERR {
            return Err(EngineError::Resource(format!(
                "failed to install handler for signal {signal}"
            )));
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn install() -> Result<()> {
    Ok(())
}

/// Flag the simulation clock polls once per tick.
pub fn interrupt_flag() -> &'static AtomicBool {
    &INTERRUPTED
}

/// Exit status for a run stopped by a signal: SIGINT is an operator stop.
pub fn interrupted_exit_code() -> i32 {
    match LAST_SIGNAL.load(Ordering::SeqCst) {
        libc::SIGINT => 0,
        _ => 1,
    }
}
