/// Amembo VM Controller - 公共库
///
/// 提供领域类型、控制状态推导、错误处理、工具函数等

pub mod errors;
pub mod models;
pub mod utils;

// 重新导出常用类型
pub use errors::{Error, Result};
pub use models::{
    derive_state, may_control, NodeObserved, VmAction, VmControlState, VmIdentity, VmObserved,
    VmPowerStatus,
};
