use anyhow::{Context, Result};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::info;

/// Cooperative stop condition. Raised once, never lowered.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true for the call that actually raised the flag.
    pub fn raise(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

static SIGNAL_STOP: OnceLock<StopFlag> = OnceLock::new();

const STOP_MESSAGE: &[u8] = b"proctrace: termination requested, stopping\n";

extern "C" fn on_stop_signal(_signal: libc::c_int) {
    // Only async-signal-safe work here: an atomic swap and write(2).
    if let Some(flag) = SIGNAL_STOP.get() {
        if flag.raise() {
            unsafe {
                libc::write(
                    libc::STDERR_FILENO,
                    STOP_MESSAGE.as_ptr() as *const libc::c_void,
                    STOP_MESSAGE.len(),
                );
            }
        }
    }
}

/// Turns SIGINT/SIGTERM into a raised [`StopFlag`].
pub struct SignalHandler;

impl SignalHandler {
    /// Installs the handlers and returns the process-wide flag they raise.
    ///
    /// No SA_RESTART: a `recv` blocked when the signal lands must come back
    /// with `EINTR` so the loop sees the flag.
    pub fn install() -> Result<StopFlag> {
        let flag = SIGNAL_STOP.get_or_init(StopFlag::new).clone();
        let action = SigAction::new(
            SigHandler::Handler(on_stop_signal),
            SaFlags::empty(),
            SigSet::empty(),
        );
        for signal in [Signal::SIGINT, Signal::SIGTERM] {
            unsafe { sigaction(signal, &action) }
                .with_context(|| format!("failed to install handler for {:?}", signal))?;
        }
        info!("SignalHandler: SIGINT and SIGTERM will stop the monitor.");
        Ok(flag)
    }
}
