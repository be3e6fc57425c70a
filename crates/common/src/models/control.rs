/// 虚拟机控制状态推导
///
/// 控制状态不做持久化，每次由虚拟化平台观测到的电源状态、所有权账本中的
/// 使用者以及会话内的"已请求关机"标记推导得出。

use serde::{Deserialize, Serialize};

use super::VmPowerStatus;

/// 单台虚拟机的控制状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmControlState {
    Stopped,
    RunningUnclaimed,
    RunningClaimedBySelf,
    RunningClaimedByOther,
    /// 已发送关机信号，虚拟机处于平台上报的过渡状态
    ShutdownRequested,
    /// 已发送关机信号但虚拟机仍在运行，可强制停止
    ForceStoppable,
    /// 平台上报的其他过渡状态，不提供任何操作
    Transitional,
}

/// 用户可触发的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmAction {
    Start,
    Shutdown,
    ForceStop,
    RefreshIp,
    WakeNode,
    Reload,
}

impl VmAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            VmAction::Start => "start",
            VmAction::Shutdown => "shutdown",
            VmAction::ForceStop => "force_stop",
            VmAction::RefreshIp => "refresh_ip",
            VmAction::WakeNode => "wake_node",
            VmAction::Reload => "reload",
        }
    }
}

impl VmControlState {
    /// 当前状态下提供给用户的操作
    pub fn actions(&self) -> Vec<VmAction> {
        match self {
            VmControlState::Stopped => vec![VmAction::Start],
            VmControlState::RunningUnclaimed | VmControlState::RunningClaimedBySelf => {
                vec![VmAction::Shutdown, VmAction::RefreshIp]
            }
            VmControlState::RunningClaimedByOther => vec![VmAction::RefreshIp],
            VmControlState::ShutdownRequested | VmControlState::ForceStoppable => {
                vec![VmAction::ForceStop, VmAction::RefreshIp]
            }
            VmControlState::Transitional => Vec::new(),
        }
    }

    pub fn allows(&self, action: VmAction) -> bool {
        self.actions().contains(&action)
    }
}

/// 所有权校验：无人使用或使用者为当前用户时才允许控制
pub fn may_control(owner: Option<&str>, current_user: &str) -> bool {
    match owner {
        None => true,
        Some(owner) => owner == current_user,
    }
}

/// 推导控制状态
pub fn derive_state(
    status: &VmPowerStatus,
    owner: Option<&str>,
    current_user: &str,
    shutdown_requested: bool,
) -> VmControlState {
    if status.is_stopped() {
        return VmControlState::Stopped;
    }

    if !may_control(owner, current_user) {
        return VmControlState::RunningClaimedByOther;
    }

    if shutdown_requested {
        return if status.is_running() {
            VmControlState::ForceStoppable
        } else {
            VmControlState::ShutdownRequested
        };
    }

    match (status, owner) {
        (VmPowerStatus::Running, None) => VmControlState::RunningUnclaimed,
        (VmPowerStatus::Running, Some(_)) => VmControlState::RunningClaimedBySelf,
        _ => VmControlState::Transitional,
    }
}
