/// 共享数据模型
///
/// 定义节点、虚拟机的标识与观测状态

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod control;

pub use control::{derive_state, may_control, VmAction, VmControlState};

use crate::utils::ledger_key;

/// 虚拟机标识：(节点名, VMID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VmIdentity {
    pub node: String,
    pub vmid: u32,
}

impl VmIdentity {
    pub fn new(node: impl Into<String>, vmid: u32) -> Self {
        Self {
            node: node.into(),
            vmid,
        }
    }

    /// 账本中使用的键 `<node>_<vmid>`
    pub fn ledger_key(&self) -> String {
        ledger_key(&self.node, self.vmid)
    }
}

impl fmt::Display for VmIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.vmid)
    }
}

/// 虚拟机电源状态
///
/// 除 `stopped` / `running` 外，虚拟化平台上报的其他过渡状态原样保留。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VmPowerStatus {
    Stopped,
    Running,
    Other(String),
}

impl VmPowerStatus {
    pub fn as_str(&self) -> &str {
        match self {
            VmPowerStatus::Stopped => "stopped",
            VmPowerStatus::Running => "running",
            VmPowerStatus::Other(s) => s.as_str(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, VmPowerStatus::Stopped)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, VmPowerStatus::Running)
    }
}

impl From<String> for VmPowerStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "stopped" => VmPowerStatus::Stopped,
            "running" => VmPowerStatus::Running,
            _ => VmPowerStatus::Other(value),
        }
    }
}

impl From<&str> for VmPowerStatus {
    fn from(value: &str) -> Self {
        VmPowerStatus::from(value.to_string())
    }
}

impl From<VmPowerStatus> for String {
    fn from(value: VmPowerStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for VmPowerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 虚拟机观测状态（每次请求实时获取）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmObserved {
    pub identity: VmIdentity,
    pub name: String,
    pub status: VmPowerStatus,
    #[serde(default)]
    pub template: bool,
}

impl VmObserved {
    /// 下拉框中显示的标签，例如 `100: web (running)`
    pub fn label(&self) -> String {
        format!("{}: {} ({})", self.identity.vmid, self.name, self.status)
    }
}

/// 节点观测状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeObserved {
    pub name: String,
    pub reachable: bool,
}

impl NodeObserved {
    pub fn reachable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reachable: true,
        }
    }

    pub fn unreachable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reachable: false,
        }
    }
}

/// 常量定义
pub mod constants {
    /// 默认 Server 端口
    pub const DEFAULT_SERVER_PORT: u16 = 3000;

    /// 默认 Proxmox API 端口
    pub const DEFAULT_PROXMOX_PORT: u16 = 8006;

    /// 默认虚拟化平台请求超时（秒）
    pub const DEFAULT_GATEWAY_TIMEOUT: u64 = 10;

    /// 默认目录服务连接超时（秒）
    pub const DEFAULT_DIRECTORY_TIMEOUT: u64 = 5;

    /// 默认会话有效期（小时）
    pub const DEFAULT_SESSION_TTL_HOURS: i64 = 12;

    /// 默认所有权账本文件
    pub const DEFAULT_LEDGER_PATH: &str = ".tmp/vm_owners.json";

    /// 默认不展示的管理节点
    pub const DEFAULT_EXCLUDED_NODE: &str = "amembonas";
}
