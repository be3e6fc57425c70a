/// LDAP 目录连接器 (ldap3)

use async_trait::async_trait;
use common::{Error, Result};
use ldap3::{ldap_escape, Ldap, LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry};
use std::time::Duration;
use tracing::{debug, warn};

use super::directory::{DirectoryConnector, DirectoryEntry};
use crate::config::LdapConfig;

/// LDAP 结果码：凭据无效
const LDAP_INVALID_CREDENTIALS: u32 = 49;

pub struct LdapConnector {
    url: String,
    bind_dn: String,
    bind_password: String,
    base_dn: String,
    login_attribute: String,
    timeout: Duration,
}

impl LdapConnector {
    pub fn new(cfg: &LdapConfig) -> Self {
        Self {
            url: cfg.url.clone(),
            bind_dn: cfg.bind_dn.clone(),
            bind_password: cfg.bind_password.clone(),
            base_dn: cfg.base_dn.clone(),
            login_attribute: cfg.login_attribute.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
        }
    }

    /// 登录名的等值过滤条件，值经过转义
    pub fn user_filter(&self, username: &str) -> String {
        format!("({}={})", self.login_attribute, ldap_escape(username))
    }

    async fn connect(&self) -> Result<Ldap> {
        let settings = LdapConnSettings::new().set_conn_timeout(self.timeout);
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &self.url)
            .await
            .map_err(directory_error)?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!("LDAP 连接错误: {}", e);
            }
        });

        Ok(ldap)
    }
}

fn directory_error(e: LdapError) -> Error {
    Error::AuthRejected(format!("目录服务错误: {}", e))
}

#[async_trait]
impl DirectoryConnector for LdapConnector {
    async fn search_user(&self, username: &str, attributes: &[&str]) -> Result<Vec<DirectoryEntry>> {
        let mut ldap = self.connect().await?;

        ldap.simple_bind(&self.bind_dn, &self.bind_password)
            .await
            .map_err(directory_error)?
            .success()
            .map_err(|e| Error::AuthRejected(format!("服务账号绑定失败: {}", e)))?;

        let filter = self.user_filter(username);
        debug!("LDAP 检索: base={}, filter={}", self.base_dn, filter);

        let (entries, _) = ldap
            .search(&self.base_dn, Scope::Subtree, &filter, attributes.to_vec())
            .await
            .map_err(directory_error)?
            .success()
            .map_err(directory_error)?;

        let _ = ldap.unbind().await;

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| DirectoryEntry {
                dn: entry.dn,
                attrs: entry.attrs,
            })
            .collect())
    }

    async fn bind_user(&self, dn: &str, password: &str) -> Result<bool> {
        let mut ldap = self.connect().await?;
        let result = ldap.simple_bind(dn, password).await.map_err(directory_error)?;
        let _ = ldap.unbind().await;

        match result.rc {
            0 => Ok(true),
            LDAP_INVALID_CREDENTIALS => Ok(false),
            rc => Err(Error::AuthRejected(format!(
                "用户绑定失败: rc={}, {}",
                rc, result.text
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector(url: &str) -> LdapConnector {
        LdapConnector::new(&LdapConfig {
            url: url.to_string(),
            bind_dn: "cn=admin,dc=example,dc=org".to_string(),
            bind_password: "admin".to_string(),
            base_dn: "ou=people,dc=example,dc=org".to_string(),
            login_attribute: "uid".to_string(),
            timeout_secs: 1,
            provision_home: false,
        })
    }

    #[test]
    fn test_user_filter_escapes_value() {
        let c = connector("ldap://localhost");
        assert_eq!(c.user_filter("alice"), "(uid=alice)");
        assert_eq!(c.user_filter("a*b)(uid=*"), r"(uid=a\2ab\29\28uid=\2a)");
    }

    #[tokio::test]
    async fn test_unreachable_directory() {
        let c = connector("ldap://127.0.0.1:1");
        let err = c.search_user("alice", &["cn"]).await.unwrap_err();
        assert!(matches!(err, Error::AuthRejected(_)));
    }
}
