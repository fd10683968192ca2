use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

/// Guards against the framing reader racing an in-flight STREAM body.
///
/// `raise` is called by the frame decoder the instant it returns a
/// `stream: true` RPC; `done` is called once the consumer (the node) has read
/// exactly the declared number of bytes off the same socket. The decoder
/// waits on [`Self::wait_clear`] before attempting to read the next frame
/// header. A defensive timeout force-clears the latch so a peer that never
/// calls `done` cannot wedge the framing reader forever.
pub struct StreamLatch {
    pending: AtomicBool,
    notify: Notify,
}

const FORCE_CLEAR_TIMEOUT: Duration = Duration::from_secs(30);

impl StreamLatch {
    pub fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn raise(&self) {
        self.pending.store(true, Ordering::SeqCst);
    }

    pub fn done(&self) {
        self.pending.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub async fn wait_clear(&self) {
        loop {
            if !self.pending.load(Ordering::SeqCst) {
                return;
            }
            let notified = self.notify.notified();
            if !self.pending.load(Ordering::SeqCst) {
                return;
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(FORCE_CLEAR_TIMEOUT) => {
                    tracing::warn!("stream latch wait timed out, forcing clear");
                    self.pending.store(false, Ordering::SeqCst);
                    return;
                }
            }
        }
    }
}

impl Default for StreamLatch {
    fn default() -> Self {
        Self::new()
    }
}
