//! Lazily initialized capability handles.
//!
//! Model loading can be expensive, so each capability is loaded at most once
//! per handle and shared afterwards. A failed load surfaces as
//! [`Error::CapabilityInit`], which aborts the run that triggered it.

use futures_util::future::BoxFuture;
use pulse_common::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info};

type Loader<T> = Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<Arc<T>>> + Send + Sync>;

/// A capability that is loaded on first use.
pub struct LazyCapability<T: ?Sized + Send + Sync> {
    name: &'static str,
    loader: Loader<T>,
    cell: OnceCell<Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> LazyCapability<T> {
    /// Create a handle that runs `loader` on first access.
    pub fn new<F, Fut>(name: &'static str, loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Arc<T>>> + Send + 'static,
    {
        Self {
            name,
            loader: Box::new(move || Box::pin(loader())),
            cell: OnceCell::new(),
        }
    }

    /// Create a handle around an already-loaded capability.
    pub fn ready(name: &'static str, value: Arc<T>) -> Self {
        let cell = OnceCell::new_with(Some(Arc::clone(&value)));
        Self {
            name,
            loader: Box::new(move || {
                let value = Arc::clone(&value);
                Box::pin(async move { Ok(value) })
            }),
            cell,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    /// Get the capability, loading it if this is the first call.
    ///
    /// Concurrent first callers wait on a single load.
    pub async fn get(&self) -> Result<Arc<T>> {
        self.cell
            .get_or_try_init(|| async {
                info!(capability = self.name, "Loading capability");
                (self.loader)().await.map_err(|e| {
                    error!(capability = self.name, error = %e, "Capability failed to load");
                    Error::capability_init(self.name, e)
                })
            })
            .await
            .map(Arc::clone)
    }
}

impl<T: ?Sized + Send + Sync> std::fmt::Debug for LazyCapability<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyCapability")
            .field("name", &self.name)
            .field("initialized", &self.cell.initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let cap: LazyCapability<String> = LazyCapability::new("echo", move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new("model".to_string()))
            }
        });

        assert!(!cap.is_initialized());
        let (a, b) = tokio::join!(cap.get(), cap.get());
        assert_eq!(a.unwrap().as_str(), "model");
        assert_eq!(b.unwrap().as_str(), "model");
        cap.get().await.unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(cap.is_initialized());
    }

    #[tokio::test]
    async fn test_failure_is_capability_init() {
        let cap: LazyCapability<String> =
            LazyCapability::new("broken", || async { Err(anyhow::anyhow!("weights missing")) });

        let err = cap.get().await.unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("broken"));
        assert!(err.to_string().contains("weights missing"));
    }

    #[tokio::test]
    async fn test_ready_handle() {
        let cap = LazyCapability::ready("fixed", Arc::new(42_u32));
        assert!(cap.is_initialized());
        assert_eq!(*cap.get().await.unwrap(), 42);
    }
}
