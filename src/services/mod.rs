pub mod identify;
pub mod store;

use std::sync::mpsc;
use std::time::Duration;

/// Run `f` on a helper thread and wait at most `timeout` for its result.
///
/// A call that overruns is abandoned (the thread finishes on its own) and
/// reported as `None`, as is a call that panics.
pub fn run_bounded<T, F>(label: &str, timeout: Duration, f: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let spawned = std::thread::Builder::new()
        .name(format!("keyfinder-{}", label))
        .spawn(move || {
            let _ = tx.send(f());
        });

    if let Err(err) = spawned {
        log::error!("Failed to start {} call: {}", label, err);
        return None;
    }

    match rx.recv_timeout(timeout) {
        Ok(value) => Some(value),
        Err(mpsc::RecvTimeoutError::Timeout) => {
            log::warn!("{} call timed out after {:.1}s", label, timeout.as_secs_f32());
            None
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            log::error!("{} call aborted", label);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_call_returns_value() {
        let value = run_bounded("test", Duration::from_secs(5), || 41 + 1);
        assert_eq!(value, Some(42));
    }

    #[test]
    fn test_slow_call_times_out() {
        let value = run_bounded("test", Duration::from_millis(50), || {
            std::thread::sleep(Duration::from_secs(2));
            1
        });
        assert_eq!(value, None);
    }

    #[test]
    fn test_panicking_call_is_none() {
        let value: Option<u32> = run_bounded("test", Duration::from_secs(5), || panic!("boom"));
        assert_eq!(value, None);
    }
}
