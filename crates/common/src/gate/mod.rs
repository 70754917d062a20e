//! Admission gate for external providers
//!
//! Local embedding and generation servers usually serve one request at a
//! time. Every call into them goes through a fixed-capacity gate: callers
//! beyond the capacity wait in arrival order (tokio's semaphore is fair),
//! give up with [`AppError::Busy`] after the queue timeout, and each admitted
//! call is bounded by its own timeout.

use crate::errors::{AppError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Fixed-capacity concurrency gate with queue and call timeouts
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    name: Arc<str>,
    permits: Arc<Semaphore>,
    capacity: usize,
    queue_timeout: Duration,
    call_timeout: Duration,
}

impl AdmissionGate {
    pub fn new(
        name: &str,
        capacity: usize,
        queue_timeout: Duration,
        call_timeout: Duration,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            name: Arc::from(name),
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            queue_timeout,
            call_timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `call` once a slot is free.
    ///
    /// Waiting longer than the queue timeout yields `Busy`; the call itself
    /// running past the call timeout yields `ProviderUnavailable`. Dropping
    /// the returned future cancels the call and releases the slot.
    pub async fn run<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let queued_at = Instant::now();
        let _permit = match tokio::time::timeout(self.queue_timeout, self.permits.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(AppError::internal(format!("{} gate closed", self.name)));
            }
            Err(_) => {
                let waited_ms = queued_at.elapsed().as_millis() as u64;
                tracing::warn!(provider = %self.name, waited_ms, "Admission queue timeout");
                crate::metrics::record_gate_rejection(&self.name);
                return Err(AppError::Busy {
                    provider: self.name.to_string(),
                    waited_ms,
                });
            }
        };

        let queued_ms = queued_at.elapsed().as_millis() as u64;
        if queued_ms > 0 {
            tracing::debug!(provider = %self.name, queued_ms, "Admitted after queueing");
        }

        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AppError::provider(
                self.name.to_string(),
                format!("call timed out after {}ms", self.call_timeout.as_millis()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_admits_within_capacity() {
        let gate = AdmissionGate::new("test", 2, Duration::from_millis(50), Duration::from_secs(1));
        let value = assert_ok!(gate.run(async { Ok::<_, AppError>(7) }).await);
        assert_eq!(value, 7);
        assert_eq!(gate.available(), 2);
    }

    #[tokio::test]
    async fn test_queue_timeout_yields_busy() {
        let gate = AdmissionGate::new("test", 1, Duration::from_millis(20), Duration::from_secs(5));
        let holder = gate.clone();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let blocker = tokio::spawn(async move {
            holder
                .run(async {
                    let _ = rx.await;
                    Ok::<_, AppError>(())
                })
                .await
        });

        // Let the blocker take the only slot
        while gate.available() > 0 {
            tokio::task::yield_now().await;
        }

        let err = assert_err!(gate.run(async { Ok::<_, AppError>(()) }).await);
        assert!(matches!(err, AppError::Busy { .. }));
        assert!(err.is_provider_failure());

        tx.send(()).unwrap();
        assert_ok!(blocker.await.unwrap());
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn test_call_timeout_yields_provider_unavailable() {
        let gate = AdmissionGate::new("slow", 1, Duration::from_secs(1), Duration::from_millis(10));
        let err = assert_err!(
            gate.run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, AppError>(())
            })
            .await
        );
        assert!(matches!(err, AppError::ProviderUnavailable { .. }));
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn test_call_error_passes_through() {
        let gate = AdmissionGate::new("test", 1, Duration::from_secs(1), Duration::from_secs(1));
        let err = assert_err!(
            gate.run(async { Err::<(), _>(AppError::provider("test", "refused")) })
                .await
        );
        assert!(matches!(err, AppError::ProviderUnavailable { .. }));
    }
}
