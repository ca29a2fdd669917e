/*!
 * Exclusive access to model capabilities.
 *
 * Neither the generator nor the translator may be driven by two requests at
 * once. Each capability sits behind a `ModelGuard`: a single-permit tokio
 * semaphore whose waiters are served in arrival order. A `ModelLease` holds
 * the permit and derefs to the capability; dropping it releases the slot on
 * every exit path (success, error, cancellation, panic unwinding).
 */

use log::{debug, warn};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::errors::{PipelineError, ProviderError};
use crate::providers::{Generator, Translator};

/// FIFO single-slot guard around a shared capability
pub struct ModelGuard<T: ?Sized> {
    name: String,
    inner: Arc<T>,
    permits: Arc<Semaphore>,
    queue_timeout: Duration,
}

impl<T: ?Sized> Clone for ModelGuard<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            inner: Arc::clone(&self.inner),
            permits: Arc::clone(&self.permits),
            queue_timeout: self.queue_timeout,
        }
    }
}

impl<T: ?Sized> fmt::Debug for ModelGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelGuard")
            .field("name", &self.name)
            .field("busy", &self.is_busy())
            .field("queue_timeout", &self.queue_timeout)
            .finish()
    }
}

impl<T: ?Sized> ModelGuard<T> {
    pub fn new(name: impl Into<String>, inner: Arc<T>, queue_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            inner,
            permits: Arc::new(Semaphore::new(1)),
            queue_timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue_timeout(&self) -> Duration {
        self.queue_timeout
    }

    /// Whether someone currently holds the lease
    pub fn is_busy(&self) -> bool {
        self.permits.available_permits() == 0
    }

    /// Wait for exclusive use.
    ///
    /// Fails with `ResourceExhausted` after the queue timeout, or with
    /// `Cancelled` as soon as `cancel` fires; either way the request leaves
    /// the queue without ever holding the slot.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<ModelLease<T>, PipelineError> {
        let started = Instant::now();
        let waiting = tokio::time::timeout(self.queue_timeout, Arc::clone(&self.permits).acquire_owned());

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            result = waiting => {
                let waited_ms = started.elapsed().as_millis() as u64;
                match result {
                    Ok(Ok(permit)) => {
                        if waited_ms > 0 {
                            debug!("Acquired {} after queueing {} ms", self.name, waited_ms);
                        }
                        Ok(ModelLease {
                            _permit: permit,
                            inner: Arc::clone(&self.inner),
                        })
                    }
                    // The semaphore is never closed; treat it like a full queue
                    Ok(Err(_)) | Err(_) => {
                        warn!("Gave up waiting for {} after {} ms", self.name, waited_ms);
                        Err(PipelineError::ResourceExhausted {
                            model: self.name.clone(),
                            waited_ms,
                        })
                    }
                }
            }
        }
    }
}

/// Scoped exclusive use of a capability
pub struct ModelLease<T: ?Sized> {
    _permit: OwnedSemaphorePermit,
    inner: Arc<T>,
}

impl<T: ?Sized> Deref for ModelLease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: ?Sized> fmt::Debug for ModelLease<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ModelLease")
    }
}

/// The guarded capabilities of one process, shared by all requests
#[derive(Debug, Clone)]
pub struct RequestSerializer {
    generator: ModelGuard<dyn Generator>,
    translator: ModelGuard<dyn Translator>,
}

impl RequestSerializer {
    pub fn new(generator: Arc<dyn Generator>, translator: Arc<dyn Translator>, queue_timeout: Duration) -> Self {
        Self {
            generator: ModelGuard::new("generator", generator, queue_timeout),
            translator: ModelGuard::new("translator", translator, queue_timeout),
        }
    }

    pub fn generator(&self) -> &ModelGuard<dyn Generator> {
        &self.generator
    }

    pub fn translator(&self) -> &ModelGuard<dyn Translator> {
        &self.translator
    }

    /// Ask each backing model whether it is reachable.
    ///
    /// No lease is taken: a health check must not queue behind a running
    /// request.
    pub async fn check_connections(&self) -> Vec<(String, Result<(), ProviderError>)> {
        let generator = self.generator.inner.test_connection().await;
        let translator = self.translator.inner.test_connection().await;
        vec![
            (self.generator.name().to_string(), generator),
            (self.translator.name().to_string(), translator),
        ]
    }
}
