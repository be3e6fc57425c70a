/// 工具函数集合

use uuid::Uuid;

/// 生成唯一 ID
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// 所有权账本的键：`<node>_<vmid>`
pub fn ledger_key(node: &str, vmid: u32) -> String {
    format!("{}_{}", node, vmid)
}

/// 解析账本键，在最后一个下划线处切分，节点名本身可以包含下划线
pub fn parse_ledger_key(key: &str) -> Option<(String, u32)> {
    let (node, vmid) = key.rsplit_once('_')?;
    if node.is_empty() {
        return None;
    }
    let vmid = vmid.parse().ok()?;
    Some((node.to_string(), vmid))
}

/// 比较节点名（不区分大小写）
pub fn same_node_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
