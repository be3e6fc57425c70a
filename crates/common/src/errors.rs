use thiserror::Error;

/// 统一错误类型
///
/// 所有错误都在单次用户操作的边界内被恢复并返回给前端，不会导致进程退出。
#[derive(Error, Debug)]
pub enum Error {
    /// 凭据错误与目录服务不可达对用户呈现为同一种错误
    #[error("认证失败: {0}")]
    AuthRejected(String),

    #[error("主目录创建失败: {0}")]
    Provisioning(String),

    #[error("无法连接虚拟化平台: {0}")]
    GatewayUnreachable(String),

    /// 所有权校验拒绝了该操作，重试也不会成功
    #[error("操作被拒绝: {0}")]
    ActionRejected(String),

    #[error("当前状态不允许该操作: {0}")]
    InvalidState(String),

    #[error("所有权账本写入失败: {0}")]
    Persistence(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无效参数: {0}")]
    InvalidArgument(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl Error {
    /// 机器可读的错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthRejected(_) => "AUTH_REJECTED",
            Self::Provisioning(_) => "PROVISIONING_ERROR",
            Self::GatewayUnreachable(_) => "GATEWAY_UNREACHABLE",
            Self::ActionRejected(_) => "ACTION_REJECTED",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// 统一结果类型
pub type Result<T> = std::result::Result<T, Error>;
