/// 会话管理
///
/// 每个登录会话在服务端保存一个 `SessionContext`，其中记录了本会话中
/// 已发送关机信号的虚拟机。该标记只属于 (会话, 虚拟机)，不写入账本。

use chrono::{DateTime, Utc};
use common::utils::generate_id;
use common::VmIdentity;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// 请求级控制上下文
#[derive(Debug, Clone)]
pub struct SessionContext {
    username: String,
    shutdown_requested: HashSet<VmIdentity>,
}

impl SessionContext {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            shutdown_requested: HashSet::new(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn is_shutdown_requested(&self, id: &VmIdentity) -> bool {
        self.shutdown_requested.contains(id)
    }

    pub fn mark_shutdown_requested(&mut self, id: &VmIdentity) {
        self.shutdown_requested.insert(id.clone());
    }

    /// 返回标记之前是否存在
    pub fn clear_shutdown_requested(&mut self, id: &VmIdentity) -> bool {
        self.shutdown_requested.remove(id)
    }
}

pub type SharedContext = Arc<Mutex<SessionContext>>;

/// 认证中间件注入到请求中的当前会话
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub sid: String,
    pub username: String,
    pub context: SharedContext,
}

struct SessionEntry {
    context: SharedContext,
    expires_at: DateTime<Utc>,
}

/// 会话存储（仅内存，进程重启后需要重新登录）
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建会话，顺便清理已过期的会话
    pub async fn create(&self, username: &str, expires_at: DateTime<Utc>) -> String {
        let sid = generate_id();
        let now = Utc::now();

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, entry| entry.expires_at > now);
        sessions.insert(
            sid.clone(),
            SessionEntry {
                context: Arc::new(Mutex::new(SessionContext::new(username))),
                expires_at,
            },
        );
        debug!("创建会话 {} ({})，当前会话数 {}", sid, username, sessions.len());
        sid
    }

    pub async fn get(&self, sid: &str) -> Option<SharedContext> {
        let sessions = self.sessions.read().await;
        sessions
            .get(sid)
            .filter(|entry| entry.expires_at > Utc::now())
            .map(|entry| entry.context.clone())
    }

    pub async fn remove(&self, sid: &str) -> bool {
        self.sessions.write().await.remove(sid).is_some()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_context_markers_are_per_vm() {
        let mut ctx = SessionContext::new("alice");
        let a = VmIdentity::new("alpha", 100);
        let b = VmIdentity::new("alpha", 101);

        ctx.mark_shutdown_requested(&a);
        assert!(ctx.is_shutdown_requested(&a));
        assert!(!ctx.is_shutdown_requested(&b));

        assert!(ctx.clear_shutdown_requested(&a));
        assert!(!ctx.clear_shutdown_requested(&a));
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionStore::new();
        let expires = Utc::now() + Duration::hours(1);
        let s1 = store.create("alice", expires).await;
        let s2 = store.create("alice", expires).await;
        let vm = VmIdentity::new("alpha", 100);

        store.get(&s1).await.unwrap().lock().await.mark_shutdown_requested(&vm);
        assert!(!store.get(&s2).await.unwrap().lock().await.is_shutdown_requested(&vm));
    }

    #[tokio::test]
    async fn test_remove_and_expiry() {
        let store = SessionStore::new();
        let live = store.create("alice", Utc::now() + Duration::hours(1)).await;
        let stale = store.create("bob", Utc::now() - Duration::seconds(1)).await;

        assert!(store.get(&stale).await.is_none());
        assert!(store.remove(&live).await);
        assert!(store.get(&live).await.is_none());

        // 创建新会话时清理过期会话
        store.create("carol", Utc::now() + Duration::hours(1)).await;
        assert_eq!(store.len().await, 1);
    }
}
