//! Change notification fan-out.
//!
//! Listeners are invoked on the operation thread after each successful
//! mutation or non-empty pull; they must return quickly or hand off to their
//! own executor. Registration and removal are allowed at any time.

use std::sync::{Arc, Mutex};

/// Observer of fabric configuration changes.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self);
}

impl<F: Fn() + Send + Sync> ChangeListener for F {
    fn on_change(&self) {
        self()
    }
}

/// Events the repository transport reports back to the store.
pub trait RemoteEvents: Send + Sync {
    /// The upstream remote URL changed (or became known).
    fn on_remote_url_changed(&self, url: &str);

    /// Someone pushed new commits into the repository.
    fn on_receive_pack(&self);
}

/// Registry of change listeners.
#[derive(Default)]
pub struct ChangePublisher {
    listeners: Mutex<Vec<Arc<dyn ChangeListener>>>,
}

impl ChangePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, listener: Arc<dyn ChangeListener>) {
        self.listeners.lock().expect("listener lock").push(listener);
    }

    pub fn unbind(&self, listener: &Arc<dyn ChangeListener>) {
        self.listeners
            .lock()
            .expect("listener lock")
            .retain(|existing| !Arc::ptr_eq(existing, listener));
    }

    /// Invoke every listener on the calling thread.
    pub fn fire(&self) {
        let listeners: Vec<_> = self
            .listeners
            .lock()
            .expect("listener lock")
            .iter()
            .cloned()
            .collect();
        tracing::debug!(count = listeners.len(), "firing change notifications");
        for listener in listeners {
            listener.on_change();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn fires_all_bound_listeners() {
        let publisher = ChangePublisher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let a = {
            let hits = hits.clone();
            Arc::new(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            }) as Arc<dyn ChangeListener>
        };
        let b = {
            let hits = hits.clone();
            Arc::new(move || {
                hits.fetch_add(10, Ordering::SeqCst);
            }) as Arc<dyn ChangeListener>
        };
        publisher.bind(a.clone());
        publisher.bind(b);
        publisher.fire();
        assert_eq!(hits.load(Ordering::SeqCst), 11);

        publisher.unbind(&a);
        publisher.fire();
        assert_eq!(hits.load(Ordering::SeqCst), 21);
    }
}
