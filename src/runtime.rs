//! Async driver for [`ConnectivityManager`].
//!
//! The manager runs on one tokio task. Collaborators and the host post
//! [`Event`]s through a cloneable [`ConnectivityHandle`]; the task sleeps until
//! the nearest timer deadline or the next event, whichever comes first.
//!
//! ```ignore
//! let (handle, inbox) = runtime::channel();
//! let service = ConnectivityService::spawn(manager, inbox);
//! handle.send(Command::SetEnabled(true))?;
//! println!("{}", handle.dump().await?);
//! let manager = service.shutdown().await?;
//! ```

use crate::event::Event;
use crate::manager::ConnectivityManager;
use log::debug;
use std::fmt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

enum Request {
    Event(Event),
    Dump(oneshot::Sender<String>),
}

/// Errors from the service handle.
#[derive(Debug)]
pub enum ServiceError {
    /// The service task has stopped.
    Closed,
    /// The service task panicked.
    Panicked(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "connectivity service stopped"),
            Self::Panicked(e) => write!(f, "connectivity service panicked: {}", e),
        }
    }
}

impl std::error::Error for ServiceError {}

/// Receiving end of [`channel`], consumed by [`ConnectivityService::spawn`].
pub struct Inbox(mpsc::UnboundedReceiver<Request>);

/// Cloneable sender for events and dump requests.
#[derive(Clone)]
pub struct ConnectivityHandle {
    tx: mpsc::UnboundedSender<Request>,
}

/// Create a handle and the inbox it feeds.
pub fn channel() -> (ConnectivityHandle, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ConnectivityHandle { tx }, Inbox(rx))
}

impl ConnectivityHandle {
    /// Queue an event. Never blocks.
    pub fn send(&self, event: impl Into<Event>) -> Result<(), ServiceError> {
        self.tx
            .send(Request::Event(event.into()))
            .map_err(|_| ServiceError::Closed)
    }

    /// Current state dump.
    pub async fn dump(&self) -> Result<String, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Request::Dump(reply))
            .map_err(|_| ServiceError::Closed)?;
        response.await.map_err(|_| ServiceError::Closed)
    }
}

/// The running event loop.
pub struct ConnectivityService {
    cancel: CancellationToken,
    task: JoinHandle<ConnectivityManager>,
}

impl ConnectivityService {
    /// Spawn the loop on the current tokio runtime.
    pub fn spawn(manager: ConnectivityManager, inbox: Inbox) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(manager, inbox, cancel.clone()));
        Self { cancel, task }
    }

    /// Token that stops the loop when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the loop and hand back the manager.
    pub async fn shutdown(self) -> Result<ConnectivityManager, ServiceError> {
        self.cancel.cancel();
        self.task
            .await
            .map_err(|e| ServiceError::Panicked(e.to_string()))
    }
}

fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

async fn run(
    mut manager: ConnectivityManager,
    mut inbox: Inbox,
    cancel: CancellationToken,
) -> ConnectivityManager {
    loop {
        let deadline = manager.next_deadline();
        let timer = async move {
            match deadline {
                Some(d) => tokio::time::sleep_until(tokio::time::Instant::from_std(d)).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Connectivity service shutting down");
                break;
            }

            request = inbox.0.recv() => {
                let now = now();
                manager.advance_to(now);
                match request {
                    Some(Request::Event(event)) => manager.handle_event(event, now),
                    Some(Request::Dump(reply)) => {
                        let _ = reply.send(manager.dump(now));
                    }
                    None => {
                        debug!("All connectivity handles dropped");
                        break;
                    }
                }
            }

            _ = timer => manager.advance_to(now()),
        }
    }
    manager
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::StrongestSignalSelector;
    use crate::config::SchedulerConfig;
    use crate::diag::ConnectivityStats;
    use crate::event::Command;
    use crate::manager::Collaborators;
    use crate::state::ScreenState;
    use crate::testing::{FakeScanEngine, FakeSessions, SharedConfigStore};
    use crate::wifi::NetworkConfig;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_service_fires_timers_on_tokio_clock() {
        let scanner = FakeScanEngine::new();
        let manager = ConnectivityManager::new(
            SchedulerConfig::default(),
            Collaborators {
                scanner: Box::new(scanner.clone()),
                sessions: Box::new(FakeSessions::with_primary()),
                store: Box::new(SharedConfigStore::with_networks([
                    NetworkConfig::new("office", "Office").unwrap(),
                ])),
                selector: Box::new(StrongestSignalSelector::default()),
            },
            Arc::new(ConnectivityStats::new()),
        )
        .unwrap();

        let (handle, inbox) = channel();
        let service = ConnectivityService::spawn(manager, inbox);
        handle.send(Command::SetScreenState(ScreenState::On)).unwrap();
        handle.send(Command::SetEnabled(true)).unwrap();

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(scanner.scan_count(), 2);

        let dump = handle.dump().await.unwrap();
        assert!(dump.contains("running: true"));

        let manager = service.shutdown().await.unwrap();
        assert!(manager.is_running());
        assert!(handle.send(Command::SetEnabled(false)).is_err());
    }
}
