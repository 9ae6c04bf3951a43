use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::domain::AdoptionApplication;
use super::repository::{
    AdoptionRepository, ApplicationFilter, ChangeEvent, Collection, RepositoryError,
};

pub type ApplicationSnapshot = Result<Vec<AdoptionApplication>, RepositoryError>;

/// Standing query over the applications collection.
///
/// Each delivery is the full matching result set. Dropping the handle or calling
/// [`ApplicationSubscription::cancel`] stops the background listener.
pub struct ApplicationSubscription {
    snapshots: mpsc::Receiver<ApplicationSnapshot>,
    listener: JoinHandle<()>,
}

impl ApplicationSubscription {
    pub(crate) async fn start<R>(
        repository: Arc<R>,
        filter: ApplicationFilter,
        buffer: usize,
    ) -> Result<Self, RepositoryError>
    where
        R: AdoptionRepository + 'static,
    {
        // Subscribe before the initial read so no change slips between the two.
        let changes = repository.changes();
        let initial = repository.list_applications(&filter).await?;

        let (sender, snapshots) = mpsc::channel(buffer.max(1));
        // Capacity is at least one and the receiver is still held, so this cannot fail.
        let _ = sender.try_send(Ok(initial));

        let listener = tokio::spawn(listen(repository, filter, changes, sender));
        Ok(Self {
            snapshots,
            listener,
        })
    }

    /// Wait for the next result set. `None` once the store's change feed has closed.
    pub async fn next(&mut self) -> Option<ApplicationSnapshot> {
        self.snapshots.recv().await
    }

    /// Take a result set that is already queued without waiting.
    pub fn try_next(&mut self) -> Option<ApplicationSnapshot> {
        self.snapshots.try_recv().ok()
    }

    pub fn cancel(self) {
        drop(self);
    }

    pub fn is_active(&self) -> bool {
        !self.listener.is_finished()
    }
}

impl Drop for ApplicationSubscription {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn listen<R>(
    repository: Arc<R>,
    filter: ApplicationFilter,
    mut changes: broadcast::Receiver<ChangeEvent>,
    sender: mpsc::Sender<ApplicationSnapshot>,
) where
    R: AdoptionRepository + 'static,
{
    loop {
        match changes.recv().await {
            Ok(event) if event.collection != Collection::AdoptionApplications => continue,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "application feed lagged; re-querying");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }

        let snapshot = repository.list_applications(&filter).await;
        if let Err(error) = &snapshot {
            warn!(%error, "live application query failed");
        }
        if sender.send(snapshot).await.is_err() {
            break;
        }
    }
}
