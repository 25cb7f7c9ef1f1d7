//! Pooled ingester clients
//!
//! One long-lived client per ingester address, created on first use and
//! kept until the address leaves the ring. The map is read-mostly: lookups
//! take the read lock, misses dial under the write lock so concurrent
//! misses for one address cost exactly one connect.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::client::{IngesterClient, IngesterConnector};
use crate::{Error, Result};

/// Cache of one client per ingester address.
pub struct IngesterClientPool {
    clients: RwLock<HashMap<String, Arc<dyn IngesterClient>>>,
    connector: Arc<dyn IngesterConnector>,
    remote_timeout: Duration,
    /// Mirror of the map size, readable at metric-scrape time without
    /// touching the async lock.
    size: AtomicUsize,
}

impl IngesterClientPool {
    pub fn new(connector: Arc<dyn IngesterConnector>, remote_timeout: Duration) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            connector,
            remote_timeout,
            size: AtomicUsize::new(0),
        }
    }

    /// Returns the pooled client for `address`, dialing one on miss.
    ///
    /// The write lock is held across the dial: concurrent misses for the
    /// same address wait for the first connect instead of racing it. A
    /// dial error is returned to the caller and nothing is cached.
    pub async fn get(&self, address: &str) -> Result<Arc<dyn IngesterClient>> {
        if let Some(client) = self.clients.read().await.get(address) {
            return Ok(client.clone());
        }

        let mut clients = self.clients.write().await;
        if let Some(client) = clients.get(address) {
            return Ok(client.clone());
        }

        debug!(address, "dialing new ingester client");
        let client = match tokio::time::timeout(self.remote_timeout, self.connector.connect(address))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::upstream(
                    address,
                    format!("connect timed out after {:?}", self.remote_timeout),
                ))
            }
        };

        clients.insert(address.to_string(), client.clone());
        self.size.store(clients.len(), Ordering::Relaxed);
        Ok(client)
    }

    /// Drops every pooled client whose address is not in `ring_addresses`.
    ///
    /// Connection teardown runs on a spawned task so it cannot block the
    /// pool lock.
    pub async fn prune_absent(&self, ring_addresses: &HashSet<String>) {
        let removed = {
            let mut clients = self.clients.write().await;
            let mut removed = Vec::new();
            clients.retain(|address, client| {
                if ring_addresses.contains(address) {
                    true
                } else {
                    removed.push((address.clone(), client.clone()));
                    false
                }
            });
            self.size.store(clients.len(), Ordering::Relaxed);
            removed
        };

        if removed.is_empty() {
            return;
        }
        tokio::spawn(async move {
            for (address, client) in removed {
                info!(address, "removing stale ingester client");
                client.close().await;
            }
        });
    }

    /// Number of pooled clients.
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
