//! Process-wide runtime flags shared by every worker.

use tokio::sync::watch;

use super::SingleFlight;

/// Read side of the runtime flags, cloned into every cycle.
#[derive(Clone)]
pub struct RuntimeContext {
    online: watch::Receiver<bool>,
    shutdown: watch::Receiver<bool>,
    single_flight: SingleFlight,
}

/// Write side of the runtime flags, owned by the supervisor.
pub struct RuntimeHandle {
    online: watch::Sender<bool>,
    shutdown: watch::Sender<bool>,
    context: RuntimeContext,
}

impl RuntimeHandle {
    /// New flags: online, not shutting down.
    pub fn new() -> Self {
        let (online_tx, online_rx) = watch::channel(true);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            online: online_tx,
            shutdown: shutdown_tx,
            context: RuntimeContext {
                online: online_rx,
                shutdown: shutdown_rx,
                single_flight: SingleFlight::new(),
            },
        }
    }

    pub fn context(&self) -> RuntimeContext {
        self.context.clone()
    }

    /// Update connectivity; returns true when the value changed.
    pub fn set_online(&self, online: bool) -> bool {
        self.online.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        })
    }

    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

impl Default for RuntimeHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeContext {
    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn single_flight(&self) -> &SingleFlight {
        &self.single_flight
    }

    /// Wait until connectivity is up. Returns false if shutdown comes first.
    pub async fn wait_online(&self) -> bool {
        let mut online = self.online.clone();
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            result = online.wait_for(|up| *up) => result.is_ok() && !self.is_shutting_down(),
            _ = shutdown.wait_for(|stop| *stop) => false,
        }
    }

    /// Resolves once shutdown has been requested (or the handle is gone).
    pub async fn shutdown_requested(&self) {
        let mut shutdown = self.shutdown.clone();
        let _ = shutdown.wait_for(|stop| *stop).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_online_resumes_when_connectivity_returns() {
        let handle = RuntimeHandle::new();
        let ctx = handle.context();
        assert!(handle.set_online(false));
        assert!(!handle.set_online(false));
        assert!(!ctx.is_online());

        let waiter = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.wait_online().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        handle.set_online(true);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_wait_online() {
        let handle = RuntimeHandle::new();
        let ctx = handle.context();
        handle.set_online(false);

        let waiter = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.wait_online().await }
        });
        handle.request_shutdown();
        assert!(!waiter.await.unwrap());
        assert!(ctx.is_shutting_down());

        tokio::time::timeout(Duration::from_secs(1), ctx.shutdown_requested())
            .await
            .unwrap();
    }
}
