// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Caller-supplied processing callbacks.
//!
//! Sinks hand items to a [`Processor`] (one item at a time) or a
//! [`BatchProcessor`] (one owned batch at a time). Both are implemented for
//! plain async closures, so most callers never name the traits:
//!
//! ```
//! use ingest_sinks::{Processor, ProcessError};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let double_check = |n: u32| async move {
//!     if n % 2 == 0 { Ok(()) } else { Err(ProcessError::new("odd")) }
//! };
//! assert!(double_check.process(2).await.is_ok());
//! assert!(double_check.process(3).await.is_err());
//! # }
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;

use crate::error::ProcessError;

#[async_trait]
pub trait Processor<T>: Send + Sync + 'static {
    async fn process(&self, item: T) -> Result<(), ProcessError>;
}

#[async_trait]
pub trait BatchProcessor<T>: Send + Sync + 'static {
    /// Receives up to `batch_size` items in submission order.
    async fn process_batch(&self, items: Vec<T>) -> Result<(), ProcessError>;
}

#[async_trait]
impl<T, F, Fut> Processor<T> for F
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ProcessError>> + Send + 'static,
{
    async fn process(&self, item: T) -> Result<(), ProcessError> {
        (self)(item).await
    }
}

#[async_trait]
impl<T, F, Fut> BatchProcessor<T> for F
where
    T: Send + 'static,
    F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ProcessError>> + Send + 'static,
{
    async fn process_batch(&self, items: Vec<T>) -> Result<(), ProcessError> {
        (self)(items).await
    }
}

/// Await a processor call, turning a panic into an ordinary failure so the
/// worker that made the call survives.
pub(crate) async fn guarded<F>(call: F) -> Result<(), ProcessError>
where
    F: Future<Output = Result<(), ProcessError>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(ProcessError::new(format!(
            "processor panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl Processor<String> for Counting {
        async fn process(&self, item: String) -> Result<(), ProcessError> {
            if item.is_empty() {
                return Err(ProcessError::new("empty item"));
            }
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_struct_processor() {
        let p = Counting { seen: AtomicUsize::new(0) };
        p.process("a".into()).await.unwrap();
        assert!(p.process(String::new()).await.is_err());
        assert_eq!(p.seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closure_batch_processor() {
        let total = Arc::new(AtomicUsize::new(0));
        let p = {
            let total = total.clone();
            move |items: Vec<u8>| {
                let total = total.clone();
                async move {
                    total.fetch_add(items.len(), Ordering::SeqCst);
                    Ok::<(), ProcessError>(())
                }
            }
        };
        p.process_batch(vec![1, 2, 3]).await.unwrap();
        assert_eq!(total.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_processor_as_trait_object() {
        let p: Arc<dyn Processor<u32>> = Arc::new(|n: u32| async move {
            if n > 10 {
                Err(ProcessError::new("too big"))
            } else {
                Ok(())
            }
        });
        assert!(p.process(3).await.is_ok());
        assert_eq!(p.process(11).await, Err(ProcessError::new("too big")));
    }

    #[tokio::test]
    async fn test_guarded_converts_panic_to_failure() {
        let p = |n: u32| async move {
            if n == 13 {
                panic!("unlucky {n}");
            }
            Ok::<(), ProcessError>(())
        };
        assert!(guarded(p.process(1)).await.is_ok());
        let err = guarded(p.process(13)).await.unwrap_err();
        assert_eq!(err.message(), "processor panicked: unlucky 13");
    }
}
