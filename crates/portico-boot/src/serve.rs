//! The serve registry.

use std::future::Future;
use std::pin::Pin;

use parking_lot::Mutex;

use crate::error::{BootError, BoxError};
use crate::shutdown::ShutdownRegistrar;
use crate::BootResult;

pub(crate) type ServeFuture = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send + 'static>>;
pub(crate) type Registrant = Box<dyn FnOnce(ShutdownRegistrar) -> ServeFuture + Send + 'static>;

#[derive(Default)]
struct ServeState {
    registrants: Vec<Registrant>,
    started: bool,
}

/// Registrants waiting for `run`. Taken exactly once.
#[derive(Default)]
pub(crate) struct ServeRegistry {
    state: Mutex<ServeState>,
}

impl ServeRegistry {
    pub(crate) fn add<F, Fut>(&self, serve: F) -> BootResult<()>
    where
        F: FnOnce(ShutdownRegistrar) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let mut state = self.state.lock();
        if state.started {
            return Err(BootError::AlreadyStarted);
        }
        state
            .registrants
            .push(Box::new(move |registrar| -> ServeFuture {
                Box::pin(serve(registrar))
            }));
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().registrants.len()
    }

    /// Moves every registrant out. Returns an empty list when nothing was
    /// registered, leaving the registry open so the caller can report it.
    /// Fails with `AlreadyStarted` once the registrants have been taken.
    pub(crate) fn take(&self) -> BootResult<Vec<Registrant>> {
        let mut state = self.state.lock();
        if state.started {
            return Err(BootError::AlreadyStarted);
        }
        if state.registrants.is_empty() {
            return Ok(Vec::new());
        }
        state.started = true;
        Ok(std::mem::take(&mut state.registrants))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_closes_registry() {
        let registry = ServeRegistry::default();
        registry.add(|_| async { Ok(()) }).unwrap();
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.take().unwrap().len(), 1);
        assert!(matches!(
            registry.add(|_| async { Ok(()) }),
            Err(BootError::AlreadyStarted)
        ));
        assert!(matches!(registry.take(), Err(BootError::AlreadyStarted)));
    }

    #[test]
    fn test_take_on_empty_registry_keeps_it_open() {
        let registry = ServeRegistry::default();
        assert!(registry.take().unwrap().is_empty());
        assert!(registry.add(|_| async { Ok(()) }).is_ok());
    }
}
