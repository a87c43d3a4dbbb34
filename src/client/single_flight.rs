//! Single-flight coordination
//!
//! Concurrent callers of [`SingleFlight::run`] share one execution of the
//! supplied future. Callers that arrive while it is in flight receive a
//! clone of its result; the next call after completion starts a new one.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared};

type Flight<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

pub struct SingleFlight<T, E> {
    inflight: Mutex<Option<Flight<T, E>>>,
}

impl<T, E> SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(None),
        }
    }

    /// Whether a call is currently in flight.
    pub fn is_inflight(&self) -> bool {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Join the in-flight call, or start one with `start` when there is none.
    ///
    /// `start` is only invoked by the caller that opens a new flight.
    pub async fn run<F, Fut>(&self, start: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let flight = {
            let mut slot = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(flight) => flight.clone(),
                None => {
                    let flight = start().boxed().shared();
                    *slot = Some(flight.clone());
                    flight
                }
            }
        };

        let result = flight.clone().await;

        let mut slot = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&flight)) {
            *slot = None;
        }

        result
    }
}

impl<T, E> Default for SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
