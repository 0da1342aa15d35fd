//! Change notification for feature-flag clients.
//!
//! When a client's flag snapshot is replaced, [`ChangeNotifier::notify`] works out
//! which flags actually changed their served value and delivers callbacks to the
//! observers that asked for them, one delivery at a time on a dedicated task.

pub mod config;
pub mod diff;
pub mod dispatch;
pub mod error;
pub mod flag;
pub mod notifier;
pub mod observer;

pub use diff::{changed_keys, DiffOptions};
pub use error::{ConfigError, Error, NotifierError, ObserverError, SnapshotError};
pub use flag::{ChangedFlag, FlagRecord, FlagSnapshot, FlagValueSource};
pub use notifier::ChangeNotifier;
pub use observer::{
    ChangeHandler, FlagChangeObserver, FlagKeys, FlagsUnchangedObserver, ObserverBuilder, Owner,
    OwnerRef,
};
