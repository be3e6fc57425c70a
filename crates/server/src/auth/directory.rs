/// 目录服务网关
///
/// 先用服务账号检索用户条目，再以用户自己的 DN 和密码绑定验证（Search & Bind）。

use async_trait::async_trait;
use common::Result;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// 检索用户时请求的属性
pub const USER_ATTRIBUTES: [&str; 4] = ["cn", "homeDirectory", "uidNumber", "gidNumber"];

/// 认证成功后的身份信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub username: String,
    pub display_name: Option<String>,
    pub home_directory: Option<String>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl Identity {
    /// 主目录、uid、gid 均存在时才可以创建主目录
    pub fn posix_home(&self) -> Option<(&str, u32, u32)> {
        match (&self.home_directory, self.uid, self.gid) {
            (Some(home), Some(uid), Some(gid)) if !home.is_empty() => Some((home.as_str(), uid, gid)),
            _ => None,
        }
    }
}

/// 认证结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated(Identity),
    Rejected,
}

/// 目录服务网关 Trait
#[async_trait]
pub trait DirectoryGateway: Send + Sync + 'static {
    /// `Err` 表示目录服务本身不可用，`Rejected` 表示凭据错误或用户不存在
    async fn authenticate(&self, username: &str, password: &str) -> Result<AuthOutcome>;
}

/// 目录检索结果条目
#[derive(Debug, Clone, Default)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attrs: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn first(&self, attr: &str) -> Option<&str> {
        self.attrs
            .get(attr)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// 目录连接器 Trait：只负责检索和绑定两个底层动作
#[async_trait]
pub trait DirectoryConnector: Send + Sync + 'static {
    /// 以服务账号绑定后，用单一等值过滤条件检索登录名
    async fn search_user(&self, username: &str, attributes: &[&str]) -> Result<Vec<DirectoryEntry>>;

    /// 以用户 DN 绑定，返回密码是否正确
    async fn bind_user(&self, dn: &str, password: &str) -> Result<bool>;
}

/// Search & Bind 认证
pub struct SearchThenBind<C> {
    connector: C,
}

impl<C: DirectoryConnector> SearchThenBind<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl<C: DirectoryConnector> DirectoryGateway for SearchThenBind<C> {
    async fn authenticate(&self, username: &str, password: &str) -> Result<AuthOutcome> {
        // 空密码会被 LDAP 当作匿名绑定而"成功"
        if username.trim().is_empty() || password.is_empty() {
            debug!("用户名或密码为空，拒绝认证");
            return Ok(AuthOutcome::Rejected);
        }

        let entries = self.connector.search_user(username, &USER_ATTRIBUTES).await?;
        let Some(entry) = entries.into_iter().next() else {
            info!("目录中未找到用户: {}", username);
            return Ok(AuthOutcome::Rejected);
        };

        if !self.connector.bind_user(&entry.dn, password).await? {
            info!("用户 {} 密码校验失败", username);
            return Ok(AuthOutcome::Rejected);
        }

        let identity = Identity {
            username: username.to_string(),
            display_name: entry.first("cn").map(str::to_string),
            home_directory: entry.first("homeDirectory").map(str::to_string),
            uid: entry.first("uidNumber").and_then(|v| v.parse().ok()),
            gid: entry.first("gidNumber").and_then(|v| v.parse().ok()),
        };
        Ok(AuthOutcome::Authenticated(identity))
    }
}
