/// 配置管理
///
/// 配置按以下顺序叠加：结构体默认值 -> 配置文件（`AMEMBO_CONFIG`，默认
/// `config/amembo.{toml,yaml,json}`，可缺省）-> 环境变量
/// `AMEMBO_<SECTION>__<KEY>`，例如 `AMEMBO_PROXMOX__HOST`。

use common::models::constants;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub proxmox: ProxmoxConfig,
    pub ldap: LdapConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub jwt_secret: String,
    pub session_ttl_hours: i64,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: constants::DEFAULT_SERVER_PORT,
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            session_ttl_hours: constants::DEFAULT_SESSION_TTL_HOURS,
            log_level: "debug".to_string(),
        }
    }
}

pub const DEFAULT_JWT_SECRET: &str = "change-me-in-production";

/// Proxmox API 连接配置
#[derive(Debug, Clone, Deserialize)]
pub struct ProxmoxConfig {
    pub host: String,
    #[serde(default = "default_proxmox_port")]
    pub port: u16,
    /// 例如 `root@pam`
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    /// API Token，格式 `USER@REALM!TOKENID=SECRET`；配置后优先于密码登录
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub verify_ssl: bool,
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
    /// 不在节点列表中展示的节点（不区分大小写）
    #[serde(default = "default_excluded_nodes")]
    pub excluded_nodes: Vec<String>,
    /// API 不可达时仍然提供给用户的节点名
    #[serde(default)]
    pub fallback_nodes: Vec<String>,
    /// 发送 WOL 的中继节点
    #[serde(default)]
    pub relay_node: Option<String>,
}

fn default_proxmox_port() -> u16 {
    constants::DEFAULT_PROXMOX_PORT
}

fn default_gateway_timeout() -> u64 {
    constants::DEFAULT_GATEWAY_TIMEOUT
}

fn default_excluded_nodes() -> Vec<String> {
    vec![constants::DEFAULT_EXCLUDED_NODE.to_string()]
}

/// LDAP 目录配置
#[derive(Debug, Clone, Deserialize)]
pub struct LdapConfig {
    /// 例如 `ldap://ldap.example.com:389`
    pub url: String,
    pub bind_dn: String,
    pub bind_password: String,
    pub base_dn: String,
    #[serde(default = "default_login_attribute")]
    pub login_attribute: String,
    #[serde(default = "default_directory_timeout")]
    pub timeout_secs: u64,
    /// 登录成功后是否创建用户主目录（需要 root 权限）
    #[serde(default = "default_true")]
    pub provision_home: bool,
}

fn default_login_attribute() -> String {
    "uid".to_string()
}

fn default_directory_timeout() -> u64 {
    constants::DEFAULT_DIRECTORY_TIMEOUT
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    File,
    Database,
}

/// 所有权账本配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,
    pub path: PathBuf,
    pub database_url: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::File,
            path: PathBuf::from(constants::DEFAULT_LEDGER_PATH),
            database_url: None,
        }
    }
}

impl Config {
    /// 从配置文件和环境变量加载配置
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("AMEMBO_CONFIG")
            .unwrap_or_else(|_| "config/amembo".to_string());

        let cfg: Config = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(Self::env_source())
            .build()?
            .try_deserialize()?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn env_source() -> config::Environment {
        config::Environment::with_prefix("AMEMBO")
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("proxmox.excluded_nodes")
            .with_list_parse_key("proxmox.fallback_nodes")
            .try_parsing(true)
    }

    /// 检查配置之间的约束
    pub fn validate(&self) -> common::Result<()> {
        if self.proxmox.host.trim().is_empty() {
            return Err(common::Error::Config("proxmox.host 不能为空".to_string()));
        }
        if self.proxmox.password.is_none() && self.proxmox.token.is_none() {
            return Err(common::Error::Config(
                "proxmox.password 与 proxmox.token 至少需要配置一个".to_string(),
            ));
        }
        if self.ledger.backend == LedgerBackend::Database && self.ledger.database_url.is_none() {
            return Err(common::Error::Config(
                "ledger.backend = database 时必须配置 ledger.database_url".to_string(),
            ));
        }
        if self.server.session_ttl_hours <= 0 {
            return Err(common::Error::Config(
                "server.session_ttl_hours 必须大于 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn from_toml(source: &str) -> anyhow::Result<Config> {
    let cfg = config::Config::builder()
        .add_source(config::File::from_str(source, config::FileFormat::Toml))
        .build()?
        .try_deserialize()?;
    Ok(cfg)
}
