/// 应用全局状态

use std::sync::Arc;

use crate::services::{AuthService, ControlService};

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    /// 虚拟机控制服务
    pub control: Arc<ControlService>,
    /// 登录与会话
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub fn new(control: ControlService, auth: AuthService) -> Self {
        Self {
            control: Arc::new(control),
            auth: Arc::new(auth),
        }
    }

    pub fn control(&self) -> &ControlService {
        &self.control
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }
}
