//! Background chunk garbage collection.

use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{bounded, RecvTimeoutError, Sender};

use super::LargeFileStore;

pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Owned handle to the periodic large-file GC worker.
#[derive(Debug)]
pub struct LfsGcService {
    quit: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl LfsGcService {
    pub fn start(repo_root: PathBuf, interval: Duration) -> Self {
        let (quit_tx, quit_rx) = bounded::<()>(0);
        let handle = std::thread::Builder::new()
            .name("evo-lfs-gc".to_string())
            .spawn(move || {
                let store = LargeFileStore::new(repo_root);
                loop {
                    match quit_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => match store.gc() {
                            Ok(removed) if removed > 0 => {
                                tracing::debug!(removed, "large-file gc dropped chunks");
                            }
                            Ok(_) => {}
                            Err(err) => {
                                tracing::warn!(error = %err, "large-file gc tick failed");
                            }
                        },
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                    }
                }
            })
            .expect("spawn lfs gc worker");
        Self {
            quit: Some(quit_tx),
            handle: Some(handle),
        }
    }

    /// Signal cancellation and wait for the current tick to finish.
    pub fn stop(&mut self) {
        self.quit.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LfsGcService {
    fn drop(&mut self) {
        self.stop();
    }
}
