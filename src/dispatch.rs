//! Serial delivery of handler calls.
//!
//! Every handler call is queued on one unbounded channel and run, in queue
//! order, by a single Tokio task. Handlers therefore never overlap each other
//! and never run while the observer registry is locked, so a handler may
//! subscribe or unsubscribe freely.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::error::NotifierError;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Job>,
}

impl Dispatcher {
    /// Starts the delivery loop on the current Tokio runtime. The loop ends
    /// once every `Dispatcher` clone is dropped and the queue has drained.
    pub fn spawn() -> Result<Self, NotifierError> {
        let handle = Handle::try_current().map_err(|_| NotifierError::NoRuntime)?;
        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(run(rx));
        Ok(Self { tx })
    }

    /// Queues `job` behind everything already queued. Returns immediately.
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) {
        if self.tx.send(Box::new(job)).is_err() {
            warn!("delivery loop has stopped, dropping handler call");
        }
    }

    /// Resolves once every job queued before this call has run.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.dispatch(move || {
            let _ = done_tx.send(());
        });
        let _ = done_rx.await;
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = rx.recv().await {
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(job)) {
            error!(panic = panic_message(&*panic), "flag change handler panicked");
        }
    }
    debug!("delivery loop finished");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
