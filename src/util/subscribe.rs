use std::error::Error;
use std::sync::Arc;

pub type NextFn<T> = Arc<dyn Fn(&T) + Send + Sync + 'static>;
pub type ErrorFn = Arc<dyn Fn(&dyn Error) + Send + Sync + 'static>;

/// Pair of optional callbacks receiving values and errors from a subscription.
#[derive(Clone)]
pub struct PartialObserver<T> {
    pub next: Option<NextFn<T>>,
    pub error: Option<ErrorFn>,
}

impl<T> PartialObserver<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_next<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.next = Some(Arc::new(callback));
        self
    }

    pub fn with_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&dyn Error) + Send + Sync + 'static,
    {
        self.error = Some(Arc::new(callback));
        self
    }

    pub(crate) fn notify_next(&self, value: &T) {
        if let Some(next) = &self.next {
            next(value);
        }
    }

    /// Forwards `error` to the error callback, or logs it when none is set.
    pub(crate) fn notify_error(&self, error: &dyn Error) {
        match &self.error {
            Some(callback) => callback(error),
            None => log::warn!("unhandled subscription error: {error}"),
        }
    }
}

impl<T> Default for PartialObserver<T> {
    fn default() -> Self {
        Self {
            next: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "boom")
        }
    }

    impl Error for Boom {}

    #[test]
    fn dispatches_to_callbacks() {
        let values = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let (v, e) = (values.clone(), errors.clone());
        let observer = PartialObserver::new()
            .with_next(move |value: &u32| v.lock().unwrap().push(*value))
            .with_error(move |err| e.lock().unwrap().push(err.to_string()));

        observer.notify_next(&7);
        observer.notify_error(&Boom);

        assert_eq!(*values.lock().unwrap(), vec![7]);
        assert_eq!(*errors.lock().unwrap(), vec!["boom".to_string()]);
    }

    #[test]
    fn empty_observer_ignores_events() {
        let observer: PartialObserver<u32> = PartialObserver::default();
        observer.notify_next(&1);
        observer.notify_error(&Boom);
    }
}
