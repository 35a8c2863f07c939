//! Cooperative cancellation: a shared flag checked at coarse points inside jobs,
//! plus a scoped SIGINT hook that sets it.

use crate::error::{TabulateError, TabulateResult};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable handle to one shared interrupt flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// `Err(Interrupted)` once the flag is set.
    #[inline]
    pub fn checkpoint(&self) -> TabulateResult<()> {
        if self.is_cancelled() {
            Err(TabulateError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Route SIGINT into this token until the returned guard is dropped.
    pub fn install_interrupt_hook(&self) -> io::Result<InterruptHook> {
        let id = signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&self.flag))?;
        Ok(InterruptHook { id })
    }
}

/// Registered SIGINT handler; unregistered on drop so no handler state outlives a run.
pub struct InterruptHook {
    id: signal_hook::SigId,
}

impl Drop for InterruptHook {
    fn drop(&mut self) {
        let _ = signal_hook::low_level::unregister(self.id);
    }
}
