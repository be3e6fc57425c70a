/// 虚拟机所有权账本
///
/// 记录 (节点, VMID) -> 当前使用者。每次读取都从存储重新加载，
/// 每次修改都在返回前同步持久化。

pub mod db_store;
pub mod store;

pub use db_store::DbOwnerStore;
#[cfg(test)]
pub use store::MemoryStore;
pub use store::{JsonFileStore, OwnerStore};

use common::utils::parse_ledger_key;
use common::{Result, VmIdentity};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 账本中的一条所有权记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnershipRecord {
    pub identity: VmIdentity,
    pub owner: String,
}

#[derive(Clone)]
pub struct OwnershipLedger {
    store: Arc<dyn OwnerStore>,
}

impl OwnershipLedger {
    pub fn new(store: Arc<dyn OwnerStore>) -> Self {
        Self { store }
    }

    pub fn backend(&self) -> &str {
        self.store.backend()
    }

    /// 记录使用者，无条件覆盖原有记录
    pub async fn claim(&self, id: &VmIdentity, username: &str) -> Result<()> {
        self.store.put(&id.ledger_key(), username).await?;
        info!("📝 记录虚拟机 {} 的使用者: {}", id, username);
        Ok(())
    }

    /// 查询当前使用者
    pub async fn owner(&self, id: &VmIdentity) -> Result<Option<String>> {
        self.store.get(&id.ledger_key()).await
    }

    /// 清除使用者记录；记录不存在时什么也不做
    pub async fn release(&self, id: &VmIdentity) -> Result<()> {
        if self.store.remove(&id.ledger_key()).await? {
            info!("🧹 清除虚拟机 {} 的使用者记录", id);
        } else {
            debug!("虚拟机 {} 没有使用者记录", id);
        }
        Ok(())
    }

    /// 列出全部记录，无法解析的键会被跳过
    pub async fn entries(&self) -> Result<Vec<OwnershipRecord>> {
        let entries = self.store.entries().await?;
        let mut records = Vec::with_capacity(entries.len());
        for (key, owner) in entries {
            match parse_ledger_key(&key) {
                Some((node, vmid)) => records.push(OwnershipRecord {
                    identity: VmIdentity::new(node, vmid),
                    owner,
                }),
                None => warn!("跳过无法解析的账本键: {}", key),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_ledger() -> OwnershipLedger {
        OwnershipLedger::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_claim_then_owner() {
        let ledger = memory_ledger();
        let vm = VmIdentity::new("alpha", 100);

        ledger.claim(&vm, "alice").await.unwrap();
        assert_eq!(ledger.owner(&vm).await.unwrap().as_deref(), Some("alice"));

        ledger.claim(&vm, "bob").await.unwrap();
        assert_eq!(ledger.owner(&vm).await.unwrap().as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let ledger = memory_ledger();
        let vm = VmIdentity::new("alpha", 100);

        ledger.claim(&vm, "alice").await.unwrap();
        ledger.release(&vm).await.unwrap();
        assert_eq!(ledger.owner(&vm).await.unwrap(), None);

        ledger.release(&vm).await.unwrap();
        ledger.release(&vm).await.unwrap();
        assert_eq!(ledger.owner(&vm).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_identities_do_not_collide() {
        let ledger = memory_ledger();
        let a = VmIdentity::new("alpha", 100);
        let b = VmIdentity::new("beta", 100);

        ledger.claim(&a, "alice").await.unwrap();
        assert_eq!(ledger.owner(&b).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_backed_ledger_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vm_owners.json");
        let vm = VmIdentity::new("alpha", 100);

        let ledger = OwnershipLedger::new(Arc::new(JsonFileStore::new(&path)));
        ledger.claim(&vm, "alice").await.unwrap();
        drop(ledger);

        let reopened = OwnershipLedger::new(Arc::new(JsonFileStore::new(&path)));
        assert_eq!(reopened.owner(&vm).await.unwrap().as_deref(), Some("alice"));
        assert_eq!(reopened.backend(), "file");
    }

    #[tokio::test]
    async fn test_entries_skip_unparsable_keys() {
        let store = Arc::new(MemoryStore::new());
        store.put("alpha_100", "alice").await.unwrap();
        store.put("garbage", "mallory").await.unwrap();

        let ledger = OwnershipLedger::new(store);
        let records = ledger.entries().await.unwrap();
        assert_eq!(
            records,
            vec![OwnershipRecord {
                identity: VmIdentity::new("alpha", 100),
                owner: "alice".to_string(),
            }]
        );
    }
}
