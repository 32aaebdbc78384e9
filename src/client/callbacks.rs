// Copyright (c) 2026 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Callback registries for fanning out connection status and entity state changes.

use derive_more::Display;
use log::error;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Subscriber callback. Callbacks are invoked synchronously on the connection's event loop and
/// must not block.
pub type Callback<T> = Box<dyn FnMut(&T) + Send>;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Listener {
    #[display("status")]
    Status,
    #[display("state")]
    StateChange,
}

/// Handle of a registered callback, used to unsubscribe it again.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[display("{kind}#{seq}")]
pub struct SubscriptionId {
    kind: Listener,
    seq: u64,
}

impl SubscriptionId {
    pub fn kind(&self) -> Listener {
        self.kind
    }
}

/// A set of callbacks receiving the same notifications.
///
/// There's no ordering guarantee between the callbacks of a registry. A panicking callback is
/// logged and doesn't prevent the remaining callbacks from being notified.
pub struct CallbackRegistry<T> {
    kind: Listener,
    next_seq: u64,
    callbacks: HashMap<SubscriptionId, Callback<T>>,
}

impl<T> CallbackRegistry<T> {
    pub fn new(kind: Listener) -> Self {
        Self {
            kind,
            next_seq: 0,
            callbacks: Default::default(),
        }
    }

    pub fn subscribe(&mut self, callback: Callback<T>) -> SubscriptionId {
        self.next_seq += 1;
        let id = SubscriptionId {
            kind: self.kind,
            seq: self.next_seq,
        };
        self.callbacks.insert(id, callback);
        id
    }

    /// Returns `false` if the subscription doesn't exist (anymore).
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.callbacks.remove(&id).is_some()
    }

    /// Notify all callbacks.
    ///
    /// Returns the number of failed callbacks.
    pub fn dispatch(&mut self, value: &T) -> usize {
        let mut failed = 0;
        for (id, callback) in self.callbacks.iter_mut() {
            if !invoke(*id, callback, value) {
                failed += 1;
            }
        }
        failed
    }

    /// Notify a single callback. Returns `false` if the callback doesn't exist or failed.
    pub fn dispatch_to(&mut self, id: SubscriptionId, value: &T) -> bool {
        match self.callbacks.get_mut(&id) {
            Some(callback) => invoke(id, callback, value),
            None => false,
        }
    }
}

fn invoke<T>(id: SubscriptionId, callback: &mut Callback<T>, value: &T) -> bool {
    match catch_unwind(AssertUnwindSafe(|| callback.as_mut()(value))) {
        Ok(_) => true,
        Err(e) => {
            let reason = e
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| e.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            error!("Subscriber {id} failed: {reason}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder(log: &Arc<Mutex<Vec<u32>>>, tag: u32) -> Callback<u32> {
        let log = log.clone();
        Box::new(move |v: &u32| log.lock().unwrap().push(tag * 100 + v))
    }

    #[test]
    fn dispatch_notifies_every_callback() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new(Listener::StateChange);
        registry.subscribe(recorder(&log, 1));
        registry.subscribe(recorder(&log, 2));

        assert_eq!(0, registry.dispatch(&7));

        let mut values = log.lock().unwrap().clone();
        values.sort();
        assert_eq!(vec![107, 207], values);
    }

    #[test]
    fn unsubscribed_callback_is_not_notified() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new(Listener::Status);
        let first = registry.subscribe(recorder(&log, 1));
        registry.subscribe(recorder(&log, 2));

        assert!(registry.unsubscribe(first));
        assert!(!registry.unsubscribe(first), "second unsubscribe must fail");
        registry.dispatch(&1);

        assert_eq!(vec![201], *log.lock().unwrap());
        assert_eq!(1, registry.callbacks.len());
    }

    #[test]
    fn panicking_callback_does_not_interrupt_dispatch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new(Listener::StateChange);
        registry.subscribe(recorder(&log, 1));
        registry.subscribe(Box::new(|_: &u32| panic!("faulty subscriber")));
        registry.subscribe(recorder(&log, 3));

        assert_eq!(1, registry.dispatch(&5));
        // and again: the faulty subscriber stays registered but can't break the fan-out
        assert_eq!(1, registry.dispatch(&6));

        let mut values = log.lock().unwrap().clone();
        values.sort();
        assert_eq!(vec![105, 106, 305, 306], values);
    }

    #[test]
    fn subscription_ids_are_unique_per_kind() {
        let mut status = CallbackRegistry::<u32>::new(Listener::Status);
        let mut state = CallbackRegistry::<u32>::new(Listener::StateChange);
        let a = status.subscribe(Box::new(|_: &u32| {}));
        let b = state.subscribe(Box::new(|_: &u32| {}));

        assert_ne!(a, b);
        assert_eq!(Listener::Status, a.kind());
        assert_eq!("state#1", b.to_string());
    }
}
