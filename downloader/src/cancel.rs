/// Interrupt handling.
///
/// The first Ctrl+C asks the download pass to stop once the in-flight
/// transfer has finished. A second one terminates the process at once.
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{error, warn};

/// Exit status used when a second interrupt forces termination.
pub const FORCED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HaltState {
    Running = 0,
    Halting = 1,
    Terminated = 2,
}

impl HaltState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Halting,
            _ => Self::Terminated,
        }
    }
}

/// Shared halt state. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct HaltSignal {
    state: Arc<AtomicU8>,
}

impl HaltSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> HaltState {
        HaltState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// True once an interrupt has been received.
    pub fn is_halting(&self) -> bool {
        self.state() != HaltState::Running
    }

    /// Advance one step: Running -> Halting -> Terminated. Never goes back.
    pub fn interrupt(&self) -> HaltState {
        let previous = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |s| {
                Some((s + 1).min(HaltState::Terminated as u8))
            })
            .unwrap_or(HaltState::Terminated as u8);
        HaltState::from_u8((previous + 1).min(HaltState::Terminated as u8))
    }
}

/// Record one interrupt. Returns the exit status to terminate with when
/// this was the second one.
pub fn handle_interrupt(signal: &HaltSignal) -> Option<i32> {
    match signal.interrupt() {
        HaltState::Halting => {
            warn!("Interrupt received - finishing the current download, then stopping. Press Ctrl+C again to quit immediately");
            None
        }
        HaltState::Terminated => {
            error!("Second interrupt - exiting without saving");
            Some(FORCED_EXIT_CODE)
        }
        HaltState::Running => None,
    }
}

/// Listen for Ctrl+C for the rest of the process's life.
///
/// One signal stream is registered up front so an interrupt arriving while
/// the previous one is being handled is still delivered.
pub fn install_interrupt_handler(signal: HaltSignal) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal as unix_signal, SignalKind};

            let mut interrupts = match unix_signal(SignalKind::interrupt()) {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Failed to listen for interrupts: {}", e);
                    return;
                }
            };
            while interrupts.recv().await.is_some() {
                if let Some(code) = handle_interrupt(&signal) {
                    std::process::exit(code);
                }
            }
        }

        #[cfg(not(unix))]
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for interrupts: {}", e);
                return;
            }
            if let Some(code) = handle_interrupt(&signal) {
                std::process::exit(code);
            }
        }
    })
}
