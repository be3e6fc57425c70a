/// 虚拟化平台网关
///
/// 控制逻辑只依赖 `HypervisorGateway`，与 Proxmox 的 HTTP 交互在 `proxmox` 中实现

#[cfg(test)]
pub mod fake;
pub mod proxmox;
pub mod types;

pub use proxmox::ProxmoxClient;

use async_trait::async_trait;
use common::{NodeObserved, Result, VmIdentity, VmObserved};
use serde::Serialize;
use std::net::Ipv4Addr;

/// WOL 发送结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WakeReceipt {
    pub relay: String,
    pub target: String,
    /// 平台返回的目标 MAC 地址（如有）
    pub mac_address: Option<String>,
    /// 平台返回了连接错误，但唤醒包很可能已经发出
    pub uncertain: bool,
}

/// 虚拟化平台网关 Trait
///
/// 所有调用都可能因超时、拒绝连接或认证失败而返回
/// `Error::GatewayUnreachable`，调用方将其视为"节点暂时不可达"。
#[async_trait]
pub trait HypervisorGateway: Send + Sync + 'static {
    /// 列出集群节点
    async fn list_nodes(&self) -> Result<Vec<NodeObserved>>;

    /// 列出节点上的虚拟机
    async fn list_vms(&self, node: &str) -> Result<Vec<VmObserved>>;

    /// 获取单台虚拟机的当前状态
    async fn vm_status(&self, id: &VmIdentity) -> Result<VmObserved>;

    /// 启动虚拟机
    async fn start(&self, id: &VmIdentity) -> Result<()>;

    /// 发送 ACPI 关机信号
    async fn shutdown(&self, id: &VmIdentity) -> Result<()>;

    /// 强制停止
    async fn force_stop(&self, id: &VmIdentity) -> Result<()>;

    /// 通过可达的中继节点唤醒目标节点
    async fn wake_on_lan(&self, relay: &str, target: &str) -> Result<WakeReceipt>;

    /// 通过 QEMU Guest Agent 获取 IPv4 地址
    async fn guest_network_interfaces(&self, id: &VmIdentity) -> Result<Vec<Ipv4Addr>>;
}
