/// 虚拟机控制服务
///
/// 把虚拟化平台观测结果、所有权账本和会话标记组合起来，
/// 推导每台虚拟机的控制状态并执行启动、关机、强制停止和节点唤醒。
///
/// 所有权与会话标记的前置条件在调用平台之前检查；被拒绝的操作不会产生
/// 任何平台调用。平台调用失败时账本保持不变，也不会自动重试。

use common::utils::same_node_name;
use common::{
    derive_state, may_control, Error, NodeObserved, Result, VmAction, VmControlState, VmIdentity,
    VmPowerStatus,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::auth::SessionContext;
use crate::config::ProxmoxConfig;
use crate::hypervisor::{HypervisorGateway, WakeReceipt};
use crate::ledger::{OwnershipLedger, OwnershipRecord};

/// 节点相关设置
#[derive(Debug, Clone, Default)]
pub struct NodeSettings {
    pub excluded_nodes: Vec<String>,
    pub fallback_nodes: Vec<String>,
    pub relay_node: Option<String>,
}

impl From<&ProxmoxConfig> for NodeSettings {
    fn from(cfg: &ProxmoxConfig) -> Self {
        Self {
            excluded_nodes: cfg.excluded_nodes.clone(),
            fallback_nodes: cfg.fallback_nodes.clone(),
            relay_node: cfg.relay_node.clone(),
        }
    }
}

impl NodeSettings {
    fn is_excluded(&self, node: &str) -> bool {
        self.excluded_nodes.iter().any(|n| same_node_name(n, node))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeListing {
    pub api_reachable: bool,
    pub nodes: Vec<NodeObserved>,
}

/// 节点列表中的一台虚拟机
#[derive(Debug, Clone, Serialize)]
pub struct VmSummary {
    pub identity: VmIdentity,
    pub name: String,
    pub status: VmPowerStatus,
    pub label: String,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NodePanel {
    Online {
        node: String,
        vms: Vec<VmSummary>,
    },
    Offline {
        node: String,
        message: String,
        actions: Vec<VmAction>,
    },
}

impl NodePanel {
    fn offline(node: &str, message: impl Into<String>) -> Self {
        NodePanel::Offline {
            node: node.to_string(),
            message: message.into(),
            actions: vec![VmAction::WakeNode, VmAction::Reload],
        }
    }
}

/// 单台虚拟机的控制面板
#[derive(Debug, Clone, Serialize)]
pub struct VmPanel {
    pub identity: VmIdentity,
    pub name: String,
    pub status: VmPowerStatus,
    pub owner: Option<String>,
    pub state: VmControlState,
    pub actions: Vec<VmAction>,
    pub shutdown_requested: bool,
    /// 仅运行中的虚拟机查询；空列表表示 Guest Agent 尚未就绪
    pub ip_addresses: Option<Vec<Ipv4Addr>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub identity: VmIdentity,
    pub state: VmControlState,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WakeOutcome {
    pub receipt: WakeReceipt,
    pub message: String,
}

pub struct ControlService {
    hypervisor: Arc<dyn HypervisorGateway>,
    ledger: OwnershipLedger,
    settings: NodeSettings,
    /// 成功列出过的节点，API 不可达时用于兜底展示
    known_nodes: RwLock<BTreeSet<String>>,
}

impl ControlService {
    pub fn new(
        hypervisor: Arc<dyn HypervisorGateway>,
        ledger: OwnershipLedger,
        settings: NodeSettings,
    ) -> Self {
        Self {
            hypervisor,
            ledger,
            settings,
            known_nodes: RwLock::new(BTreeSet::new()),
        }
    }

    #[cfg(test)]
    pub fn ledger(&self) -> &OwnershipLedger {
        &self.ledger
    }

    /// 列出节点
    pub async fn list_nodes(&self) -> NodeListing {
        match self.hypervisor.list_nodes().await {
            Ok(nodes) => {
                let nodes: Vec<NodeObserved> = nodes
                    .into_iter()
                    .filter(|n| !self.settings.is_excluded(&n.name))
                    .collect();

                let mut known = self.known_nodes.write().await;
                known.extend(nodes.iter().map(|n| n.name.clone()));

                NodeListing {
                    api_reachable: true,
                    nodes,
                }
            }
            Err(e) => {
                warn!("⚠️  无法获取节点列表: {}", e);
                NodeListing {
                    api_reachable: false,
                    nodes: self.fallback_nodes().await,
                }
            }
        }
    }

    /// 配置的兜底节点在前，其后是之前见过的节点，全部标记为不可达
    async fn fallback_nodes(&self) -> Vec<NodeObserved> {
        let known = self.known_nodes.read().await;
        let mut names: Vec<&str> = Vec::new();
        for name in self.settings.fallback_nodes.iter().chain(known.iter()) {
            if self.settings.is_excluded(name) || names.iter().any(|n| same_node_name(n, name)) {
                continue;
            }
            names.push(name.as_str());
        }
        names.into_iter().map(NodeObserved::unreachable).collect()
    }

    /// 把请求中的节点名换成集群里的写法，每台虚拟机只对应一个账本键
    pub async fn resolve_vm(&self, node: &str, vmid: u32) -> Result<VmIdentity> {
        let known = self
            .known_nodes
            .read()
            .await
            .iter()
            .find(|n| same_node_name(n, node))
            .cloned();
        if let Some(name) = known {
            return Ok(VmIdentity::new(name, vmid));
        }

        let listing = self.list_nodes().await;
        if !listing.api_reachable {
            return Err(Error::GatewayUnreachable(format!("无法确认节点 {}", node)));
        }
        listing
            .nodes
            .into_iter()
            .find(|n| same_node_name(&n.name, node))
            .map(|n| VmIdentity::new(n.name, vmid))
            .ok_or_else(|| Error::NotFound(format!("节点 {} 不存在", node)))
    }

    /// 节点面板：节点可达时列出虚拟机（不含模板）
    pub async fn node_panel(&self, node: &str, ctx: &mut SessionContext) -> Result<NodePanel> {
        let listing = self.list_nodes().await;

        let Some(entry) = listing.nodes.iter().find(|n| same_node_name(&n.name, node)) else {
            if listing.api_reachable || self.settings.is_excluded(node) {
                return Err(Error::NotFound(format!("节点 {} 不存在", node)));
            }
            return Ok(NodePanel::offline(
                node,
                "无法连接虚拟化平台，节点可能已断电，可以尝试唤醒",
            ));
        };

        if !listing.api_reachable || !entry.reachable {
            info!("节点 {} 当前不可达", node);
            return Ok(NodePanel::offline(
                &entry.name,
                format!("节点 {} 没有响应，可能已断电，可以尝试唤醒", entry.name),
            ));
        }

        let node = entry.name.clone();
        let vms = match self.hypervisor.list_vms(&node).await {
            Ok(vms) => vms,
            Err(e) => {
                warn!("⚠️  获取节点 {} 的虚拟机列表失败: {}", node, e);
                return Ok(NodePanel::offline(
                    &node,
                    format!("节点 {} 没有响应，请稍后刷新或尝试唤醒", node),
                ));
            }
        };

        let mut summaries = Vec::with_capacity(vms.len());
        for vm in vms.into_iter().filter(|vm| !vm.template) {
            let owner = if vm.status.is_stopped() {
                self.self_heal(&vm.identity, ctx).await;
                None
            } else {
                self.read_owner(&vm.identity).await
            };
            summaries.push(VmSummary {
                label: vm.label(),
                identity: vm.identity,
                name: vm.name,
                status: vm.status,
                owner,
            });
        }

        debug!("节点 {} 共 {} 台虚拟机", node, summaries.len());
        Ok(NodePanel::Online {
            node,
            vms: summaries,
        })
    }

    /// 虚拟机面板
    pub async fn vm_panel(&self, id: &VmIdentity, ctx: &mut SessionContext) -> Result<VmPanel> {
        let vm = self.hypervisor.vm_status(id).await?;
        if vm.template {
            return Err(Error::NotFound(format!("{} 是模板，不能控制", id)));
        }

        let owner = if vm.status.is_stopped() {
            self.self_heal(id, ctx).await;
            None
        } else {
            self.read_owner(id).await
        };

        let shutdown_requested = ctx.is_shutdown_requested(id);
        let state = derive_state(&vm.status, owner.as_deref(), ctx.username(), shutdown_requested);

        let ip_addresses = if vm.status.is_running() {
            Some(self.lookup_ips(id).await)
        } else {
            None
        };

        Ok(VmPanel {
            identity: vm.identity,
            name: vm.name,
            status: vm.status,
            owner,
            actions: state.actions(),
            state,
            shutdown_requested,
            ip_addresses,
        })
    }

    /// 启动虚拟机并记录使用者
    pub async fn start(&self, id: &VmIdentity, ctx: &mut SessionContext) -> Result<ActionOutcome> {
        self.guard(id, ctx.username(), VmAction::Start).await?;

        self.hypervisor.start(id).await?;
        info!("▶️  {} 启动了虚拟机 {}", ctx.username(), id);

        self.ledger.claim(id, ctx.username()).await.map_err(|e| {
            Error::Persistence(format!("虚拟机 {} 已启动，但记录使用者失败: {}", id, e))
        })?;
        ctx.clear_shutdown_requested(id);

        Ok(ActionOutcome {
            identity: id.clone(),
            state: VmControlState::RunningClaimedBySelf,
            message: format!("虚拟机 {} 启动命令已发送", id),
        })
    }

    /// 发送 ACPI 关机信号，释放使用者记录
    pub async fn shutdown(&self, id: &VmIdentity, ctx: &mut SessionContext) -> Result<ActionOutcome> {
        if ctx.is_shutdown_requested(id) {
            return Err(Error::InvalidState(format!(
                "已经向 {} 发送过关机信号，如需立即停止请使用强制停止",
                id
            )));
        }
        self.guard(id, ctx.username(), VmAction::Shutdown).await?;

        self.hypervisor.shutdown(id).await?;
        info!("⏹️  {} 向虚拟机 {} 发送了关机信号", ctx.username(), id);

        ctx.mark_shutdown_requested(id);
        self.ledger.release(id).await?;

        Ok(ActionOutcome {
            identity: id.clone(),
            state: VmControlState::ShutdownRequested,
            message: format!("已向 {} 发送关机信号，系统没有响应时可以强制停止", id),
        })
    }

    /// 强制停止，只能在本会话发送过关机信号之后执行
    pub async fn force_stop(&self, id: &VmIdentity, ctx: &mut SessionContext) -> Result<ActionOutcome> {
        if !ctx.is_shutdown_requested(id) {
            return Err(Error::InvalidState(format!(
                "请先向 {} 发送关机信号",
                id
            )));
        }
        self.guard(id, ctx.username(), VmAction::ForceStop).await?;

        self.hypervisor.force_stop(id).await?;
        info!("⛔ {} 强制停止了虚拟机 {}", ctx.username(), id);

        ctx.clear_shutdown_requested(id);
        self.ledger.release(id).await?;

        Ok(ActionOutcome {
            identity: id.clone(),
            state: VmControlState::Stopped,
            message: format!("虚拟机 {} 已强制停止", id),
        })
    }

    /// 通过中继节点唤醒目标节点
    pub async fn wake_node(&self, target: &str) -> Result<WakeOutcome> {
        let relay = self.pick_relay(target).await?;
        let receipt = self.hypervisor.wake_on_lan(&relay, target).await?;

        let message = if receipt.uncertain {
            format!(
                "已通过 {} 发送唤醒命令（平台返回了连接错误），请几分钟后刷新",
                receipt.relay
            )
        } else {
            format!("已通过 {} 发送唤醒命令，节点启动需要几分钟", receipt.relay)
        };
        info!("⏰ {}", message);

        Ok(WakeOutcome { receipt, message })
    }

    /// 重新查询 Guest Agent 上报的 IPv4 地址
    pub async fn refresh_ip(&self, id: &VmIdentity) -> Vec<Ipv4Addr> {
        self.lookup_ips(id).await
    }

    /// 账本中的全部记录
    pub async fn owners(&self) -> Result<Vec<OwnershipRecord>> {
        self.ledger.entries().await
    }

    /// 所有权校验，每次操作都重新读取账本
    async fn guard(&self, id: &VmIdentity, username: &str, action: VmAction) -> Result<()> {
        let owner = self.ledger.owner(id).await?;
        if may_control(owner.as_deref(), username) {
            return Ok(());
        }

        let owner = owner.unwrap_or_default();
        warn!(
            "拒绝 {} 对虚拟机 {} 的 {} 操作，当前使用者: {}",
            username,
            id,
            action.as_str(),
            owner
        );
        Err(Error::ActionRejected(format!(
            "虚拟机 {} 正在被 {} 使用，不能操作",
            id, owner
        )))
    }

    /// 观测到已停止时清理残留的使用者记录和本会话的关机标记
    async fn self_heal(&self, id: &VmIdentity, ctx: &mut SessionContext) {
        ctx.clear_shutdown_requested(id);
        if let Err(e) = self.ledger.release(id).await {
            warn!("清理虚拟机 {} 的使用者记录失败: {}", id, e);
        }
    }

    async fn read_owner(&self, id: &VmIdentity) -> Option<String> {
        self.ledger.owner(id).await.unwrap_or_else(|e| {
            warn!("读取虚拟机 {} 的使用者失败: {}", id, e);
            None
        })
    }

    async fn lookup_ips(&self, id: &VmIdentity) -> Vec<Ipv4Addr> {
        match self.hypervisor.guest_network_interfaces(id).await {
            Ok(ips) => ips,
            Err(e) => {
                debug!("虚拟机 {} 的 IP 暂不可用: {}", id, e);
                Vec::new()
            }
        }
    }

    async fn pick_relay(&self, target: &str) -> Result<String> {
        if let Some(relay) = &self.settings.relay_node {
            if !same_node_name(relay, target) {
                return Ok(relay.clone());
            }
        }

        let nodes = self.hypervisor.list_nodes().await.map_err(|e| {
            Error::GatewayUnreachable(format!("没有可用的中继节点来唤醒 {}: {}", target, e))
        })?;

        nodes
            .into_iter()
            .find(|n| n.reachable && !same_node_name(&n.name, target))
            .map(|n| n.name)
            .ok_or_else(|| {
                Error::GatewayUnreachable(format!("没有可用的中继节点来唤醒 {}", target))
            })
    }
}
