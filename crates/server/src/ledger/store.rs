/// 所有权账本存储抽象层
///
/// 账本只依赖 `OwnerStore`，具体存储（JSON 文件、数据库、内存）可替换。

use async_trait::async_trait;
use common::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// 所有权存储 Trait
#[async_trait]
pub trait OwnerStore: Send + Sync + 'static {
    /// 读取一条记录（每次都从存储重新读取）
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// 写入一条记录，覆盖已有值
    async fn put(&self, key: &str, owner: &str) -> Result<()>;

    /// 删除一条记录，返回记录是否存在
    async fn remove(&self, key: &str) -> Result<bool>;

    /// 列出全部记录
    async fn entries(&self) -> Result<BTreeMap<String, String>>;

    /// 存储类型
    fn backend(&self) -> &str;
}

/// JSON 文件存储
///
/// 整个账本是一个 JSON 对象，每次修改都完整读取并完整重写文件。
/// 进程内的读改写由互斥锁串行化；不处理多进程并发写。
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取整个账本；文件不存在视为空账本，文件损坏时记录警告并视为空账本
    async fn load(&self) -> BTreeMap<String, String> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!("读取所有权账本 {} 失败，按空账本处理: {}", self.path.display(), e);
                return BTreeMap::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!("所有权账本 {} 格式错误，按空账本处理: {}", self.path.display(), e);
                BTreeMap::new()
            }
        }
    }

    /// 完整重写账本：先写临时文件再重命名
    async fn save(&self, state: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| persistence_error(&self.path, e))?;
            }
        }

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        state.serialize(&mut ser)?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &buf)
            .await
            .map_err(|e| persistence_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| persistence_error(&self.path, e))?;

        debug!("所有权账本已写入 {} ({} 条记录)", self.path.display(), state.len());
        Ok(())
    }
}

fn persistence_error(path: &Path, e: std::io::Error) -> Error {
    Error::Persistence(format!("{}: {}", path.display(), e))
}

#[async_trait]
impl OwnerStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load().await.get(key).cloned())
    }

    async fn put(&self, key: &str, owner: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load().await;
        state.insert(key.to_string(), owner.to_string());
        self.save(&state).await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load().await;
        if state.remove(key).is_none() {
            return Ok(false);
        }
        self.save(&state).await?;
        Ok(true)
    }

    async fn entries(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.load().await)
    }

    fn backend(&self) -> &str {
        "file"
    }
}

/// 内存存储，用于测试
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<BTreeMap<String, String>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
#[async_trait]
impl OwnerStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.state.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, owner: &str) -> Result<()> {
        self.state
            .lock()
            .await
            .insert(key.to_string(), owner.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.state.lock().await.remove(key).is_some())
    }

    async fn entries(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.state.lock().await.clone())
    }

    fn backend(&self) -> &str {
        "memory"
    }
}
