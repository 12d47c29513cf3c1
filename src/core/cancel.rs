use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Cooperative cancellation flag shared between the run loop and the caller.
/// The runner checks it between actions; `sleep` lets wait actions and loop
/// delays end early the moment cancellation is requested.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock().unwrap() = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap()
    }

    /// Sleeps up to `duration`, waking early on cancellation.
    /// Returns true if cancellation was observed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let deadline = Instant::now() + duration;
        let mut cancelled = flag.lock().unwrap();
        loop {
            if *cancelled {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, timeout) = cvar.wait_timeout(cancelled, deadline - now).unwrap();
            cancelled = guard;
            if timeout.timed_out() {
                return *cancelled;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_sleep_runs_to_completion_without_cancel() {
        let token = CancelToken::new();
        let start = Instant::now();
        assert!(!token.sleep(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_cancel_wakes_sleeper_early() {
        let token = CancelToken::new();
        let remote = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });

        let start = Instant::now();
        assert!(token.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_sleep_after_cancel_returns_immediately() {
        let token = CancelToken::new();
        token.cancel();
        let start = Instant::now();
        assert!(token.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
