use std::sync::{Arc, PoisonError, RwLock};

/// Receives every complete string the device sends.
pub trait Listener: Send + Sync {
    fn string_received(&self, message: &str);
}

impl<F> Listener for F
where
    F: Fn(&str) + Send + Sync,
{
    fn string_received(&self, message: &str) {
        self(message)
    }
}

/// Listeners in registration order.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<Arc<dyn Listener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn Listener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn dispatch(&self, message: &str) {
        // Clone the list so a listener may register another without deadlocking.
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for l in listeners {
            l.string_received(message);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[test]
    fn dispatches_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let reg = ListenerRegistry::new();
        for tag in ["a", "b", "c"] {
            let seen = seen.clone();
            reg.register(Arc::new(move |m: &str| {
                seen.lock().unwrap().push(format!("{tag}:{m}"))
            }));
        }
        reg.dispatch("x");
        reg.dispatch("y");
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["a:x", "b:x", "c:x", "a:y", "b:y", "c:y"]
        );
    }

    struct Counter(Mutex<usize>);

    impl Listener for Counter {
        fn string_received(&self, _message: &str) {
            *self.0.lock().unwrap() += 1;
        }
    }

    #[test]
    fn trait_objects_and_empty_registry() {
        let reg = ListenerRegistry::new();
        reg.dispatch("nobody listening");
        assert!(reg.is_empty());

        let counter = Arc::new(Counter(Mutex::new(0)));
        reg.register(counter.clone());
        reg.dispatch("one");
        reg.dispatch("two");
        assert_eq!(*counter.0.lock().unwrap(), 2);
        assert_eq!(reg.len(), 1);
    }
}
