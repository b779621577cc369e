//! Runs synchronous storage work off the async runtime.
//!
//! Store operations do file IO and back off with `std::thread::sleep` when
//! a write is contended, so long-running tasks hand them to tokio's
//! blocking pool instead of calling them inline.

use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};

/// Runs `op` on the blocking pool and flattens its result.
pub async fn run<T, E, F>(op: F) -> Result<T>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<anyhow::Error> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .context("blocking worker join failed")?
        .map_err(Into::into)
}

/// Locks a component shared with blocking work.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test(flavor = "current_thread")]
    async fn test_runtime_keeps_running_while_work_blocks() {
        let ticked = Arc::new(AtomicBool::new(false));
        let timer = tokio::spawn({
            let ticked = Arc::clone(&ticked);
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                ticked.store(true, Ordering::SeqCst);
            }
        });

        let seen = run({
            let ticked = Arc::clone(&ticked);
            move || {
                std::thread::sleep(Duration::from_millis(300));
                Ok::<_, anyhow::Error>(ticked.load(Ordering::SeqCst))
            }
        })
        .await
        .unwrap();

        assert!(seen, "timer task was starved by blocking work");
        timer.await.unwrap();
    }

    #[tokio::test]
    async fn test_errors_are_passed_through() {
        let err = run(|| Err::<(), _>(std::io::Error::other("disk full")))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "disk full");
    }

    #[tokio::test]
    async fn test_panics_surface_as_errors() {
        let err = run(|| -> Result<()> { panic!("boom") }).await.unwrap_err();
        assert!(err.to_string().contains("join failed"));
    }

    #[test]
    fn test_lock_recovers_from_poison() {
        let shared = Arc::new(Mutex::new(1));
        let poisoner = Arc::clone(&shared);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison");
        })
        .join();

        *lock(&shared) += 1;
        assert_eq!(*lock(&shared), 2);
    }
}
