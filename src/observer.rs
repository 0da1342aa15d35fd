//! Observer registrations: who is interested in which flags, and what to call.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};

use uuid::Uuid;

use crate::error::ObserverError;
use crate::flag::ChangedFlag;

pub type SingleChangeHandler = Arc<dyn Fn(ChangedFlag) + Send + Sync>;
pub type CollectionChangeHandler = Arc<dyn Fn(HashMap<String, ChangedFlag>) + Send + Sync>;
pub type UnchangedHandler = Arc<dyn Fn() + Send + Sync>;

/// The component that registers observers.
///
/// Clones share the same identity and liveness. Once every clone is dropped,
/// observers registered under this owner stop receiving deliveries and are
/// removed on the next notify round.
#[derive(Debug, Clone)]
pub struct Owner {
    id: Uuid,
    alive: Arc<()>,
}

/// Non-owning handle to an [`Owner`], held by the registry.
#[derive(Debug, Clone)]
pub struct OwnerRef {
    id: Uuid,
    alive: Weak<()>,
}

impl Owner {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            alive: Arc::new(()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn downgrade(&self) -> OwnerRef {
        OwnerRef {
            id: self.id,
            alive: Arc::downgrade(&self.alive),
        }
    }
}

impl Default for Owner {
    fn default() -> Self {
        Self::new()
    }
}

impl OwnerRef {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.alive.strong_count() > 0
    }

    pub fn is(&self, owner: &Owner) -> bool {
        self.id == owner.id
    }
}

/// Which flag keys an observer watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagKeys {
    /// Every key, including ones that do not exist yet.
    All,
    Keys(BTreeSet<String>),
}

impl FlagKeys {
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FlagKeys::Keys(keys.into_iter().map(Into::into).collect())
    }

    pub fn single(key: impl Into<String>) -> Self {
        Self::keys([key])
    }

    pub fn watches(&self, key: &str) -> bool {
        match self {
            FlagKeys::All => true,
            FlagKeys::Keys(keys) => keys.contains(key),
        }
    }

    /// True when at least one of `changed` is watched. The wildcard matches any
    /// non-empty set.
    pub fn watches_any(&self, changed: &HashSet<String>) -> bool {
        match self {
            FlagKeys::All => !changed.is_empty(),
            FlagKeys::Keys(keys) => keys.iter().any(|key| changed.contains(key)),
        }
    }
}

/// What a change observer calls: once per changed key, or once per round with
/// every matching change.
#[derive(Clone)]
pub enum ChangeHandler {
    Single(SingleChangeHandler),
    Collection(CollectionChangeHandler),
}

impl ChangeHandler {
    pub fn single(handler: impl Fn(ChangedFlag) + Send + Sync + 'static) -> Self {
        ChangeHandler::Single(Arc::new(handler))
    }

    pub fn collection(handler: impl Fn(HashMap<String, ChangedFlag>) + Send + Sync + 'static) -> Self {
        ChangeHandler::Collection(Arc::new(handler))
    }
}

impl fmt::Debug for ChangeHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeHandler::Single(_) => f.write_str("ChangeHandler::Single"),
            ChangeHandler::Collection(_) => f.write_str("ChangeHandler::Collection"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlagChangeObserver {
    pub(crate) id: Uuid,
    pub(crate) keys: FlagKeys,
    pub(crate) owner: OwnerRef,
    pub(crate) handler: ChangeHandler,
}

impl FlagChangeObserver {
    pub fn new(keys: FlagKeys, owner: &Owner, handler: ChangeHandler) -> Self {
        Self {
            id: Uuid::new_v4(),
            keys,
            owner: owner.downgrade(),
            handler,
        }
    }

    /// Starts a registration whose handler is chosen later. `build` rejects
    /// a registration with no handler or with both kinds.
    pub fn builder(keys: FlagKeys, owner: &Owner) -> ObserverBuilder {
        ObserverBuilder {
            keys,
            owner: owner.downgrade(),
            single: None,
            collection: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn keys(&self) -> &FlagKeys {
        &self.keys
    }

    pub fn owner(&self) -> &OwnerRef {
        &self.owner
    }
}

pub struct ObserverBuilder {
    keys: FlagKeys,
    owner: OwnerRef,
    single: Option<SingleChangeHandler>,
    collection: Option<CollectionChangeHandler>,
}

impl ObserverBuilder {
    pub fn on_change(mut self, handler: impl Fn(ChangedFlag) + Send + Sync + 'static) -> Self {
        self.single = Some(Arc::new(handler));
        self
    }

    pub fn on_collection_change(
        mut self,
        handler: impl Fn(HashMap<String, ChangedFlag>) + Send + Sync + 'static,
    ) -> Self {
        self.collection = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> Result<FlagChangeObserver, ObserverError> {
        let handler = match (self.single, self.collection) {
            (Some(single), None) => ChangeHandler::Single(single),
            (None, Some(collection)) => ChangeHandler::Collection(collection),
            (Some(_), Some(_)) => return Err(ObserverError::ConflictingHandlers),
            (None, None) => return Err(ObserverError::MissingHandler),
        };
        Ok(FlagChangeObserver {
            id: Uuid::new_v4(),
            keys: self.keys,
            owner: self.owner,
            handler,
        })
    }
}

#[derive(Clone)]
pub struct FlagsUnchangedObserver {
    pub(crate) id: Uuid,
    pub(crate) owner: OwnerRef,
    pub(crate) handler: UnchangedHandler,
}

impl FlagsUnchangedObserver {
    pub fn new(owner: &Owner, handler: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.downgrade(),
            handler: Arc::new(handler),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner(&self) -> &OwnerRef {
        &self.owner
    }
}

impl fmt::Debug for FlagsUnchangedObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlagsUnchangedObserver")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .finish()
    }
}
