//! Text sharing.

use crate::services::{parse_pin, whole_minutes, ContentKind, LinkBuilder, Result, ShareReceipt};
use crate::storage::{ExpiringStore, PinAllocator};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Shares short text messages under a PIN.
#[derive(Debug, Clone)]
pub struct TextService {
    store: Arc<ExpiringStore<String>>,
    allocator: PinAllocator,
    links: LinkBuilder,
}

impl TextService {
    pub fn new(store: Arc<ExpiringStore<String>>, allocator: PinAllocator, links: LinkBuilder) -> Self {
        Self {
            store,
            allocator,
            links,
        }
    }

    /// The store backing this service.
    pub fn store(&self) -> &Arc<ExpiringStore<String>> {
        &self.store
    }

    fn sweep(&self) {
        let expired = self.store.sweep(Instant::now());
        if expired > 0 {
            debug!(expired = expired, "Swept expired text shares");
        }
    }

    /// Stores `message` under a fresh PIN.
    pub async fn share(&self, message: String) -> Result<ShareReceipt> {
        let host = self.links.host().await?;

        self.sweep();
        let pin = self
            .store
            .insert_fresh(&self.allocator, Instant::now(), |_| message)?;

        let qr_code_base64 = match self.links.qr_for(host, ContentKind::Text, &pin).await {
            Ok(qr) => qr,
            Err(e) => {
                self.store.remove(&pin);
                return Err(e);
            }
        };

        info!(pin = %pin, "Text shared");

        Ok(ShareReceipt {
            pin: pin.to_string(),
            expires_in_min: whole_minutes(self.store.ttl()),
            qr_code_base64,
        })
    }

    /// Returns the message shared under `pin`.
    pub fn fetch(&self, pin: &str) -> Result<String> {
        let pin = parse_pin(pin)?;
        self.sweep();

        Ok(self.store.get(&pin)?.payload)
    }

    /// Replaces the message shared under `pin`.
    ///
    /// The share keeps its original expiry.
    pub fn replace(&self, pin: &str, message: String) -> Result<()> {
        let pin = parse_pin(pin)?;
        self.sweep();

        self.store.update(&pin, |current| *current = message)?;
        info!(pin = %pin, "Text updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ShareError;
    use crate::storage::Pin;
    use std::collections::HashSet;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    fn service() -> TextService {
        let store = Arc::new(ExpiringStore::new(Duration::from_secs(300)));
        let links = LinkBuilder::new(8000, Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))));
        TextService::new(store, PinAllocator::new(), links)
    }

    #[tokio::test]
    async fn test_share_and_fetch() {
        let service = service();

        let receipt = service.share("hello there".to_string()).await.unwrap();
        assert_eq!(receipt.pin.len(), 6);
        assert_eq!(receipt.expires_in_min, 5);
        assert!(!receipt.qr_code_base64.is_empty());

        assert_eq!(service.fetch(&receipt.pin).unwrap(), "hello there");
    }

    #[tokio::test]
    async fn test_fetch_unknown() {
        let service = service();

        assert!(matches!(service.fetch("000000"), Err(ShareError::NotFoundOrExpired)));
        assert!(matches!(service.fetch("nope"), Err(ShareError::NotFoundOrExpired)));
    }

    #[tokio::test]
    async fn test_replace_keeps_ttl() {
        let service = service();
        let receipt = service.share("m1".to_string()).await.unwrap();
        let pin = Pin::parse(&receipt.pin).unwrap();

        let now = Instant::now();
        let before = service.store().remaining_ttl(&pin, now).unwrap();

        service.replace(&receipt.pin, "m2".to_string()).unwrap();

        assert_eq!(service.fetch(&receipt.pin).unwrap(), "m2");
        let after = service.store().remaining_ttl(&pin, now).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_replace_unknown() {
        let service = service();
        assert!(matches!(
            service.replace("123456", "x".to_string()),
            Err(ShareError::NotFoundOrExpired)
        ));
    }

    #[tokio::test]
    async fn test_expired_share_is_gone() {
        let store = Arc::new(ExpiringStore::new(Duration::from_millis(20)));
        let links = LinkBuilder::new(8000, Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));
        let service = TextService::new(Arc::clone(&store), PinAllocator::new(), links);

        let receipt = service.share("short lived".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(matches!(
            service.fetch(&receipt.pin),
            Err(ShareError::NotFoundOrExpired)
        ));
        // The fetch swept it
        assert!(store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_shares_get_distinct_pins() {
        let service = Arc::new(service());
        let mut handles = Vec::with_capacity(1000);

        for i in 0..1000 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service.share(format!("message {}", i)).await.unwrap().pin
            }));
        }

        let mut pins = HashSet::new();
        for handle in handles {
            assert!(pins.insert(handle.await.unwrap()));
        }
        assert_eq!(pins.len(), 1000);
    }
}
