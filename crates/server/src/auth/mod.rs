/// 认证模块
///
/// - 目录服务 Search & Bind 认证 (LDAP)
/// - 登录后创建 POSIX 主目录
/// - JWT 会话令牌与服务端会话上下文

pub mod directory;
pub mod home;
pub mod jwt;
pub mod ldap;
pub mod session;

pub use directory::{AuthOutcome, DirectoryGateway, SearchThenBind};
pub use jwt::TokenIssuer;
pub use ldap::LdapConnector;
pub use session::{CurrentSession, SessionContext, SessionStore};
