//! The observer registry and the notify round.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::diff::{changed_keys, DiffOptions};
use crate::dispatch::Dispatcher;
use crate::error::NotifierError;
use crate::flag::{ChangedFlag, FlagSnapshot, FlagValueSource};
use crate::observer::{ChangeHandler, FlagChangeObserver, FlagKeys, FlagsUnchangedObserver, Owner};

#[derive(Default)]
struct Registry {
    change: Vec<FlagChangeObserver>,
    unchanged: Vec<FlagsUnchangedObserver>,
}

impl Registry {
    // Returns how many observers were dropped.
    fn prune(&mut self) -> usize {
        let before = self.change.len() + self.unchanged.len();
        self.change.retain(|observer| observer.owner.is_alive());
        self.unchanged.retain(|observer| observer.owner.is_alive());
        before - self.change.len() - self.unchanged.len()
    }
}

/// Tracks flag observers and tells them when a snapshot replacement changed
/// the flags they watch.
///
/// Registry operations are synchronous and take a short internal lock.
/// Handlers run later, one at a time, on a delivery task started when the
/// notifier is created.
pub struct ChangeNotifier {
    registry: Mutex<Registry>,
    dispatcher: Dispatcher,
    options: DiffOptions,
}

impl ChangeNotifier {
    /// Creates a notifier whose delivery task runs on the current Tokio runtime.
    pub fn new() -> Result<Self, NotifierError> {
        Self::with_options(DiffOptions::default())
    }

    pub fn with_options(options: DiffOptions) -> Result<Self, NotifierError> {
        Ok(Self {
            registry: Mutex::new(Registry::default()),
            dispatcher: Dispatcher::spawn()?,
            options,
        })
    }

    /// Registers a change observer. Registrations are never merged, even when
    /// the same owner subscribes to overlapping keys more than once.
    pub fn add_observer(&self, observer: FlagChangeObserver) -> Uuid {
        let id = observer.id;
        debug!(observer = %id, owner = %observer.owner.id(), keys = ?observer.keys, "flag change observer added");
        self.registry.lock().change.push(observer);
        id
    }

    pub fn subscribe(&self, keys: FlagKeys, owner: &Owner, handler: ChangeHandler) -> Uuid {
        self.add_observer(FlagChangeObserver::new(keys, owner, handler))
    }

    pub fn add_unchanged_observer(&self, observer: FlagsUnchangedObserver) -> Uuid {
        let id = observer.id;
        debug!(observer = %id, owner = %observer.owner.id(), "flags unchanged observer added");
        self.registry.lock().unchanged.push(observer);
        id
    }

    pub fn subscribe_unchanged(&self, owner: &Owner, handler: impl Fn() + Send + Sync + 'static) -> Uuid {
        self.add_unchanged_observer(FlagsUnchangedObserver::new(owner, handler))
    }

    /// Removes every change observer of `owner` whose key set is exactly `keys`.
    pub fn unsubscribe(&self, keys: &FlagKeys, owner: &Owner) {
        let mut registry = self.registry.lock();
        let before = registry.change.len();
        registry
            .change
            .retain(|observer| !(observer.owner.is(owner) && observer.keys == *keys));
        debug!(owner = %owner.id(), removed = before - registry.change.len(), "flag change observers removed");
    }

    pub fn unsubscribe_key(&self, key: &str, owner: &Owner) {
        self.unsubscribe(&FlagKeys::single(key), owner);
    }

    /// Removes every change and unchanged observer registered by `owner`.
    pub fn unsubscribe_all(&self, owner: &Owner) {
        let mut registry = self.registry.lock();
        let before = registry.change.len() + registry.unchanged.len();
        registry.change.retain(|observer| !observer.owner.is(owner));
        registry.unchanged.retain(|observer| !observer.owner.is(owner));
        let removed = before - registry.change.len() - registry.unchanged.len();
        debug!(owner = %owner.id(), removed, "all observers removed for owner");
    }

    /// Compares `old` with `new` for `user_key` and queues deliveries.
    ///
    /// Observers whose owner is gone are dropped first. Deliveries already
    /// queued always run, even if their owner is released in the meantime. If no flag value
    /// changed, every unchanged observer is called once. Otherwise each change
    /// observer watching a changed key receives the changes it watches. The
    /// call returns before any handler runs.
    pub fn notify(&self, user_key: &str, new: &FlagSnapshot, old: &FlagSnapshot, old_source: FlagValueSource) {
        let changed = changed_keys(old, new, self.options);

        let mut registry = self.registry.lock();
        let pruned = registry.prune();
        if pruned > 0 {
            debug!(pruned, "dropped observers with released owners");
        }

        if changed.is_empty() {
            debug!(user = user_key, observers = registry.unchanged.len(), "flags unchanged");
            for observer in &registry.unchanged {
                let handler = Arc::clone(&observer.handler);
                self.dispatcher.dispatch(move || handler());
            }
            return;
        }

        let selected: Vec<FlagChangeObserver> = registry
            .change
            .iter()
            .filter(|observer| observer.keys.watches_any(&changed))
            .cloned()
            .collect();
        drop(registry);

        debug!(user = user_key, changed = changed.len(), observers = selected.len(), "flags changed");
        if selected.is_empty() {
            return;
        }

        let changed_flags: HashMap<String, ChangedFlag> = changed
            .iter()
            .map(|key| (key.clone(), ChangedFlag::between(key, old, old_source, new)))
            .collect();

        for observer in selected {
            let filtered: HashMap<String, ChangedFlag> = match &observer.keys {
                FlagKeys::All => changed_flags.clone(),
                keys => changed_flags
                    .iter()
                    .filter(|(key, _)| keys.watches(key))
                    .map(|(key, flag)| (key.clone(), flag.clone()))
                    .collect(),
            };
            trace!(observer = %observer.id, delivered = filtered.len(), "queueing flag changes");

            match observer.handler {
                ChangeHandler::Collection(handler) => {
                    self.dispatcher.dispatch(move || handler(filtered));
                }
                ChangeHandler::Single(handler) => {
                    for (_, flag) in filtered {
                        let handler = Arc::clone(&handler);
                        self.dispatcher.dispatch(move || handler(flag));
                    }
                }
            }
        }
    }

    /// Resolves once every delivery queued so far has run.
    pub async fn flush(&self) {
        self.dispatcher.flush().await;
    }

    pub fn flag_observer_count(&self) -> usize {
        self.registry.lock().change.len()
    }

    pub fn unchanged_observer_count(&self) -> usize {
        self.registry.lock().unchanged.len()
    }
}
