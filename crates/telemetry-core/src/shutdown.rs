//! Cooperative cancellation for worker threads.
//!
//! A [`ShutdownTrigger`] owns the only sender of a channel that never carries a
//! message. Cancelling drops that sender, which wakes every [`ShutdownToken`]
//! blocked in [`ShutdownToken::sleep`] immediately.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Create a linked trigger/token pair.
pub fn shutdown_pair() -> (ShutdownTrigger, ShutdownToken) {
    let (tx, rx) = channel::bounded::<()>(0);
    let cancelled = Arc::new(AtomicBool::new(false));
    (
        ShutdownTrigger {
            cancelled: Arc::clone(&cancelled),
            sender: Arc::new(Mutex::new(Some(tx))),
        },
        ShutdownToken {
            cancelled,
            receiver: rx,
        },
    )
}

#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    cancelled: Arc<AtomicBool>,
    sender: Arc<Mutex<Option<Sender<()>>>>,
}

impl ShutdownTrigger {
    /// Request shutdown. Safe to call more than once.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.sender.lock().take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownToken {
    cancelled: Arc<AtomicBool>,
    receiver: Receiver<()>,
}

impl ShutdownToken {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless shutdown is requested first.
    ///
    /// Returns `true` if the sleep was cut short by cancellation.
    pub fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        match self.receiver.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => self.is_cancelled(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_sleep_runs_to_completion_without_cancel() {
        let (_trigger, token) = shutdown_pair();
        let start = Instant::now();
        assert!(!token.sleep(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_cancel_interrupts_sleep() {
        let (trigger, token) = shutdown_pair();
        let worker = thread::spawn(move || {
            let start = Instant::now();
            let cancelled = token.sleep(Duration::from_secs(10));
            (cancelled, start.elapsed())
        });

        thread::sleep(Duration::from_millis(20));
        trigger.cancel();
        trigger.cancel();

        let (cancelled, elapsed) = match worker.join() {
            Ok(result) => result,
            Err(_) => panic!("sleeping thread panicked"),
        };
        assert!(cancelled);
        assert!(elapsed < Duration::from_secs(2));
    }

    #[test]
    fn test_cancelled_token_returns_immediately() {
        let (trigger, token) = shutdown_pair();
        trigger.cancel();
        assert!(token.is_cancelled());
        assert!(token.sleep(Duration::from_secs(10)));
    }
}
