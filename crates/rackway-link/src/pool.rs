//! Connection pooling keyed by controller host.
//!
//! Devices mounted on the same controller share one connection. The pool is
//! an owned component injected into the device monitor at construction, not
//! a process-wide registry: tests build as many independent pools as they
//! like, and dropping the pool drops its connections.

use crate::traits::DeviceLink;
use rackway_core::{Result, profile::LinkAddress};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Factory producing a fresh, not-yet-connected link for an address.
pub type LinkFactory<L> = Box<dyn Fn(&LinkAddress) -> L + Send + Sync>;

/// One link per controller host, created on demand.
pub struct LinkPool<L: DeviceLink> {
    factory: LinkFactory<L>,
    links: Mutex<HashMap<String, Arc<L>>>,
}

impl<L: DeviceLink> LinkPool<L> {
    /// Create a pool that builds links with the given factory.
    ///
    /// # Examples
    ///
    /// ```
    /// use rackway_link::{LinkPool, MockLink};
    ///
    /// let pool = LinkPool::new(Box::new(|addr| MockLink::new(addr).0));
    /// assert_eq!(pool.len(), 0);
    /// ```
    pub fn new(factory: LinkFactory<L>) -> Self {
        Self {
            factory,
            links: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the link for an address and make sure it is connected.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::ConnectionFailed`](rackway_core::Error::ConnectionFailed)
    /// from the link's own retry logic. The link stays pooled so a later
    /// acquire retries on the same instance.
    pub async fn acquire(&self, address: &LinkAddress) -> Result<Arc<L>> {
        let link = {
            let mut links = self.links.lock().unwrap_or_else(|e| e.into_inner());
            match links.get(&address.host) {
                Some(link) => Arc::clone(link),
                None => {
                    debug!("Creating link for controller {}", address.host);
                    let link = Arc::new((self.factory)(address));
                    links.insert(address.host.clone(), Arc::clone(&link));
                    link
                }
            }
        };

        link.ensure_connected().await?;
        Ok(link)
    }

    /// Drop the pooled link for a host, if any. The next acquire for that
    /// host builds a fresh one.
    pub fn release(&self, host: &str) -> bool {
        let mut links = self.links.lock().unwrap_or_else(|e| e.into_inner());
        links.remove(host).is_some()
    }

    /// Whether a link for this host is currently pooled and connected.
    pub fn is_connected(&self, host: &str) -> bool {
        let links = self.links.lock().unwrap_or_else(|e| e.into_inner());
        links.get(host).is_some_and(|link| link.is_connected())
    }

    /// Number of pooled links.
    pub fn len(&self) -> usize {
        self.links.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the pool holds no links.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
