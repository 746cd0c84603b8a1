use std::{future::Future, time::Duration};

/// An explicitly injected handle for spawning background work, so nothing in
/// the service reaches for a hidden global. One instance is constructed at
/// process start and threaded through `AppState`.
#[derive(Clone)]
pub enum Executor {
    Production,
}

impl Executor {
    pub fn spawn_detached<F>(&self, future: F)
    where
        F: 'static + Send + Future<Output = ()>,
    {
        match self {
            Executor::Production => {
                tokio::spawn(future);
            }
        }
    }

    pub async fn sleep(&self, duration: Duration) {
        match self {
            Executor::Production => tokio::time::sleep(duration).await,
        }
    }
}
