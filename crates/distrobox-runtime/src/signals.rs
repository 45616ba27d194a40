use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Record Ctrl-C instead of dying, so long waits can stop cleanly.
///
/// The flag is only consulted by the Readiness Gate; an interactive session
/// receives the signal through the terminal and handles it itself.
pub fn install_signal_handler() {
    let _ = ctrlc::set_handler(move || {
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
    });
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}
