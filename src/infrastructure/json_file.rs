use super::in_memory::InMemoryOrderStore;
use crate::domain::order::Order;
use crate::domain::ports::OrderStore;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Orders persisted as a JSON array in a single file.
///
/// Reads are served from memory; every `save` rewrites the file through a temporary
/// sibling and a rename, so a crash never leaves a half-written document. A failed
/// write leaves the in-memory view untouched.
pub struct JsonFileOrderStore {
    path: PathBuf,
    orders: InMemoryOrderStore,
    write_lock: Mutex<()>,
}

impl JsonFileOrderStore {
    /// Loads the file, or starts empty when it does not exist yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let orders: Vec<Order> = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => Vec::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            orders: InMemoryOrderStore::with_orders(orders),
            write_lock: Mutex::new(()),
        })
    }

    /// Writes `orders` through a temporary sibling and a rename.
    async fn persist(&self, orders: &[Order]) -> Result<()> {
        let body = serde_json::to_vec_pretty(orders)?;

        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| PaymentError::Storage(format!("{} is not a file", self.path.display())))?;
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);

        tokio::fs::write(&tmp, body).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(PaymentError::Storage(format!(
                "could not replace {}: {e}",
                self.path.display()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for JsonFileOrderStore {
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Order>> {
        self.orders.find_by_reference(reference).await
    }

    async fn find_awaiting_eligible(&self) -> Result<Vec<Order>> {
        self.orders.find_awaiting_eligible().await
    }

    /// The file is written first; memory only changes once the write succeeded.
    async fn save(&self, order: Order) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut snapshot = self.orders.all().await;
        match snapshot
            .iter_mut()
            .find(|o| o.reference.eq_ignore_ascii_case(&order.reference))
        {
            Some(existing) => *existing = order.clone(),
            None => {
                snapshot.push(order.clone());
                snapshot.sort_by(|a, b| a.reference.cmp(&b.reference));
            }
        }
        self.persist(&snapshot).await?;
        self.orders.save(order).await
    }
}
