//! Live status view: relay feed + directory snapshot + reconciler
//!
//! The feed task is started before the snapshot is requested so nothing
//! published in between is lost; the reconciler buffers those events and
//! replays them once the snapshot lands.

use tokio::task::JoinHandle;

use crate::directory::DirectoryClient;
use crate::realtime::RelayConnection;
use crate::reconciler::Reconciler;

/// A running status view
pub struct LiveStatus {
    reconciler: Reconciler,
    feed: Option<JoinHandle<()>>,
}

impl LiveStatus {
    /// Start the feed on `connection`, then seed `reconciler` from the
    /// directory snapshot.
    ///
    /// A failed snapshot is logged and the list starts empty.
    pub async fn start(
        directory: &DirectoryClient,
        connection: RelayConnection,
        reconciler: Reconciler,
    ) -> Self {
        let feed = tokio::spawn(run_feed(connection, reconciler.clone()));

        let snapshot = match directory.list_users().await {
            Ok(users) => {
                tracing::info!("Loaded {} users", users.len());
                users
            }
            Err(e) => {
                tracing::error!("Failed to fetch users: {}", e);
                Vec::new()
            }
        };
        reconciler.initialize(snapshot);

        Self {
            reconciler,
            feed: Some(feed),
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Whether the relay feed is still running
    pub fn is_live(&self) -> bool {
        self.feed.as_ref().is_some_and(|feed| !feed.is_finished())
    }

    /// Stop the feed and release the reconciler's listeners. Idempotent.
    pub fn teardown(&mut self) {
        if let Some(feed) = self.feed.take() {
            feed.abort();
            self.reconciler.teardown();
        }
    }
}

impl Drop for LiveStatus {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn run_feed(mut connection: RelayConnection, reconciler: Reconciler) {
    while let Some(frame) = connection.next_frame().await {
        match frame {
            Ok(frame) => {
                reconciler.apply_json(frame.payload.get());
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!("Relay feed from {} ended: {}", connection.url(), e);
                return;
            }
            Err(e) => tracing::debug!("Skipping relay frame: {}", e),
        }
    }
    tracing::info!("Relay closed the feed from {}", connection.url());
}
