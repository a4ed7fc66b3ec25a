//! Cooperative shutdown flag.
//!
//! Termination signals flip a single shared atomic; the worker loop consults
//! it at safe checkpoints (before each selection round and after each ack)
//! and never aborts an operation mid-flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};

#[derive(Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Install handlers for SIGINT, SIGTERM and SIGQUIT that request shutdown.
///
/// Must be called from within a tokio runtime.
pub fn install_signal_handlers(shutdown: &Shutdown) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        for kind in [
            SignalKind::interrupt(),
            SignalKind::terminate(),
            SignalKind::quit(),
        ] {
            let mut stream = signal(kind)
                .map_err(|e| Error::Other(format!("failed to install signal handler: {e}")))?;
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                stream.recv().await;
                shutdown.request();
            });
        }
    }

    #[cfg(not(unix))]
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            shutdown.request();
        });
    }

    Ok(())
}
