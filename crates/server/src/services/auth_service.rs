/// 登录认证服务
///
/// 目录认证 -> 创建主目录（可选）-> 创建服务端会话 -> 签发 JWT

use chrono::{DateTime, Utc};
use common::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::auth::home::provision_home;
use crate::auth::{AuthOutcome, CurrentSession, DirectoryGateway, SessionStore, TokenIssuer};

/// 凭据错误和目录不可用对用户显示同一条提示
const LOGIN_FAILED: &str = "用户名或密码错误";

#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub token: String,
    pub username: String,
    pub display_name: Option<String>,
    pub expires_at: DateTime<Utc>,
    /// 不影响登录结果的提示，例如主目录创建失败
    pub warnings: Vec<String>,
}

pub struct AuthService {
    directory: Arc<dyn DirectoryGateway>,
    tokens: TokenIssuer,
    sessions: SessionStore,
    provision_home: bool,
}

impl AuthService {
    pub fn new(
        directory: Arc<dyn DirectoryGateway>,
        tokens: TokenIssuer,
        sessions: SessionStore,
        provision_home: bool,
    ) -> Self {
        Self {
            directory,
            tokens,
            sessions,
            provision_home,
        }
    }

    /// 用户登录
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResult> {
        let identity = match self.directory.authenticate(username, password).await {
            Ok(AuthOutcome::Authenticated(identity)) => identity,
            Ok(AuthOutcome::Rejected) => {
                warn!("用户 {} 登录失败", username);
                return Err(Error::AuthRejected(LOGIN_FAILED.to_string()));
            }
            Err(e) => {
                error!("❌ 目录服务认证出错 ({}): {}", username, e);
                return Err(Error::AuthRejected(LOGIN_FAILED.to_string()));
            }
        };

        let mut warnings = Vec::new();
        if self.provision_home {
            match identity.posix_home() {
                Some((home, uid, gid)) => match provision_home(home, uid, gid).await {
                    Ok(_) => {}
                    Err(e) => {
                        warn!("⚠️  用户 {} 主目录创建失败: {}", username, e);
                        warnings.push(e.to_string());
                    }
                },
                None => info!("用户 {} 缺少主目录或 uid/gid 信息，跳过主目录创建", username),
            }
        }

        let expires_at = self.tokens.expires_at();
        let sid = self.sessions.create(&identity.username, expires_at).await;
        let token = self.tokens.issue(&identity.username, &sid, expires_at)?;

        info!("✅ 用户 {} 登录成功", identity.username);
        Ok(LoginResult {
            token,
            username: identity.username,
            display_name: identity.display_name,
            expires_at,
            warnings,
        })
    }

    /// 校验令牌并找到对应的服务端会话
    pub async fn authenticate_token(&self, token: &str) -> Result<CurrentSession> {
        let claims = self.tokens.verify(token)?;
        let context = self
            .sessions
            .get(&claims.sid)
            .await
            .ok_or_else(|| Error::AuthRejected("会话已失效，请重新登录".to_string()))?;

        Ok(CurrentSession {
            sid: claims.sid,
            username: claims.sub,
            context,
        })
    }

    /// 注销会话，之后令牌不再被接受
    pub async fn logout(&self, session: &CurrentSession) {
        if self.sessions.remove(&session.sid).await {
            info!("👋 用户 {} 已注销", session.username);
        }
    }
}
