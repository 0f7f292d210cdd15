//! Debug-mode flow serialization.

use std::sync::Arc;

use relaybus_core::MessageContext;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::traits::DebugManager;

/// Debug manager plus the environment-wide lock that lets only one injected
/// flow run at a time while a debugger is attached.
pub struct DebugSession {
    manager: Arc<dyn DebugManager>,
    flow_lock: Arc<Mutex<()>>,
}

impl DebugSession {
    #[must_use]
    pub fn new(manager: Arc<dyn DebugManager>) -> Self {
        Self {
            manager,
            flow_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Wait for the flow lock, then advertise the flow start.
    pub async fn begin(&self, ctx: &MessageContext) -> DebugFlow {
        let guard = Arc::clone(&self.flow_lock).lock_owned().await;
        self.manager.flow_started(ctx);
        DebugFlow {
            manager: Arc::clone(&self.manager),
            _guard: guard,
        }
    }
}

/// An open debug flow. Holds the flow lock until [`DebugFlow::end`].
#[must_use = "the flow lock is released when the flow ends"]
pub struct DebugFlow {
    manager: Arc<dyn DebugManager>,
    _guard: OwnedMutexGuard<()>,
}

impl DebugFlow {
    /// Advertise the flow end and release the lock.
    pub fn end(self, ctx: &MessageContext) {
        self.manager.flow_terminated(ctx);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parking_lot::Mutex as SyncMutex;

    use super::*;

    #[derive(Default)]
    struct Recording(SyncMutex<Vec<String>>);

    impl DebugManager for Recording {
        fn flow_started(&self, ctx: &MessageContext) {
            self.0.lock().push(format!("start:{}", ctx.message_id()));
        }

        fn flow_terminated(&self, ctx: &MessageContext) {
            self.0.lock().push(format!("end:{}", ctx.message_id()));
        }
    }

    #[tokio::test]
    async fn flows_are_serialized() {
        let manager = Arc::new(Recording::default());
        let session = Arc::new(DebugSession::new(manager.clone()));

        let first = MessageContext::with_id("m1");
        let flow = session.begin(&first).await;

        let waiter = tokio::spawn({
            let session = Arc::clone(&session);
            async move {
                let second = MessageContext::with_id("m2");
                session.begin(&second).await.end(&second);
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*manager.0.lock(), vec!["start:m1"]);

        flow.end(&first);
        waiter.await.unwrap();
        assert_eq!(*manager.0.lock(), vec!["start:m1", "end:m1", "start:m2", "end:m2"]);
    }
}
