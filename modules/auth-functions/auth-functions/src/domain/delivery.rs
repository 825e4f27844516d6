//! Exactly-once result delivery.

use std::sync::Arc;

use auth_functions_sdk::{AsyncResultSink, InvocationContext, Outcome, Payload};
use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Delivers the result of one invocation to its sink.
///
/// The first [`deliver`](Self::deliver) wins. If the guard is dropped
/// without delivering (task aborted or panicked), `onFail` is delivered
/// with an empty payload.
pub struct Delivery {
    sink: Arc<dyn AsyncResultSink>,
    context: Option<InvocationContext>,
}

impl Delivery {
    #[must_use]
    pub fn new(sink: Arc<dyn AsyncResultSink>, context: InvocationContext) -> Self {
        Self {
            sink,
            context: Some(context),
        }
    }

    pub fn deliver(mut self, payload: Payload, outcome: Outcome) {
        self.send(payload, outcome);
    }

    fn send(&mut self, payload: Payload, outcome: Outcome) {
        if let Some(context) = self.context.take() {
            tracing::debug!(
                tenant = %context.tenant_domain,
                context_id = %context.context_id,
                %outcome,
                "delivering result"
            );
            self.sink.deliver(context, payload, outcome);
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if let Some(context) = &self.context {
            tracing::error!(
                tenant = %context.tenant_domain,
                context_id = %context.context_id,
                "invocation ended without a result"
            );
        }
        self.send(Payload::new(), Outcome::Fail);
    }
}

/// Result received through a [`OneshotSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct Delivered {
    pub context: InvocationContext,
    pub payload: Payload,
    pub outcome: Outcome,
}

/// Sink that forwards the first delivery to a oneshot channel.
///
/// For callers that await the result instead of being resumed.
pub struct OneshotSink {
    tx: Mutex<Option<oneshot::Sender<Delivered>>>,
}

impl OneshotSink {
    #[must_use]
    pub fn channel() -> (Arc<Self>, oneshot::Receiver<Delivered>) {
        let (tx, rx) = oneshot::channel();
        let sink = Arc::new(Self {
            tx: Mutex::new(Some(tx)),
        });
        (sink, rx)
    }
}

impl AsyncResultSink for OneshotSink {
    fn deliver(&self, context: InvocationContext, payload: Payload, outcome: Outcome) {
        let Some(tx) = self.tx.lock().take() else {
            tracing::warn!(context_id = %context.context_id, "result already delivered");
            return;
        };
        // Receiver dropped means nobody waits for the result
        let _ = tx.send(Delivered {
            context,
            payload,
            outcome,
        });
    }
}
