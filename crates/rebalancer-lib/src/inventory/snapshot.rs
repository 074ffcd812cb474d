//! Shared container set
//!
//! The refresh loop publishes a complete new set; readers take one `Arc`
//! snapshot per iteration. A reader therefore sees either the old or the new
//! set in full.

use crate::models::ContainerRef;
use std::sync::Arc;
use tokio::sync::watch;

/// Handle to the current container set, cheap to clone
#[derive(Debug, Clone)]
pub struct ContainerInventory {
    tx: Arc<watch::Sender<Arc<Vec<ContainerRef>>>>,
}

impl ContainerInventory {
    pub fn new(initial: Vec<ContainerRef>) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(sanitize(initial)));
        Self { tx: Arc::new(tx) }
    }

    /// Current set
    pub fn snapshot(&self) -> Arc<Vec<ContainerRef>> {
        self.tx.borrow().clone()
    }

    /// Replace the whole set, returning the number of containers kept
    pub fn replace(&self, containers: Vec<ContainerRef>) -> usize {
        let containers = Arc::new(sanitize(containers));
        let count = containers.len();
        self.tx.send_replace(containers);
        count
    }

    /// Receiver notified on every replacement
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<ContainerRef>>> {
        self.tx.subscribe()
    }

    /// First container whose id appears in the sample's container name
    pub fn find_match(
        snapshot: &[ContainerRef],
        container_name: &str,
    ) -> Option<ContainerRef> {
        snapshot.iter().find(|c| c.matches(container_name)).cloned()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }
}

/// An empty id would match every sample
fn sanitize(containers: Vec<ContainerRef>) -> Vec<ContainerRef> {
    containers.into_iter().filter(|c| !c.id.is_empty()).collect()
}
