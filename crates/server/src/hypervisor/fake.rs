/// 测试用的内存虚拟化平台，记录每一次调用

use async_trait::async_trait;
use common::{Error, NodeObserved, Result, VmIdentity, VmObserved, VmPowerStatus};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Mutex;

use super::{HypervisorGateway, WakeReceipt};

#[derive(Default)]
pub struct FakeHypervisor {
    /// `None` 表示节点列表请求超时
    nodes: Mutex<Option<Vec<NodeObserved>>>,
    /// 不在表中的节点视为不可达
    vms: Mutex<HashMap<String, Vec<VmObserved>>>,
    ips: Mutex<HashMap<VmIdentity, Vec<Ipv4Addr>>>,
    fail_actions: Mutex<bool>,
    wake_uncertain: Mutex<bool>,
    calls: Mutex<Vec<String>>,
}

impl FakeHypervisor {
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(Some(Vec::new())),
            ..Default::default()
        }
    }

    pub fn with_node(self, name: &str, reachable: bool) -> Self {
        if let Some(nodes) = self.nodes.lock().unwrap().as_mut() {
            nodes.push(if reachable {
                NodeObserved::reachable(name)
            } else {
                NodeObserved::unreachable(name)
            });
        }
        if reachable {
            self.vms.lock().unwrap().entry(name.to_string()).or_default();
        }
        self
    }

    pub fn with_vm(self, node: &str, vmid: u32, name: &str, status: &str) -> Self {
        self.vms
            .lock()
            .unwrap()
            .entry(node.to_string())
            .or_default()
            .push(VmObserved {
                identity: VmIdentity::new(node, vmid),
                name: name.to_string(),
                status: VmPowerStatus::from(status),
                template: false,
            });
        self
    }

    pub fn with_template(self, node: &str, vmid: u32, name: &str) -> Self {
        self.vms
            .lock()
            .unwrap()
            .entry(node.to_string())
            .or_default()
            .push(VmObserved {
                identity: VmIdentity::new(node, vmid),
                name: name.to_string(),
                status: VmPowerStatus::Stopped,
                template: true,
            });
        self
    }

    pub fn with_ips(self, id: &VmIdentity, ips: &[Ipv4Addr]) -> Self {
        self.ips.lock().unwrap().insert(id.clone(), ips.to_vec());
        self
    }

    /// 节点列表请求超时
    pub fn node_list_times_out(self) -> Self {
        *self.nodes.lock().unwrap() = None;
        self
    }

    pub fn break_node_list(&self) {
        *self.nodes.lock().unwrap() = None;
    }

    /// 节点在列表中但虚拟机列表请求失败
    pub fn vm_list_fails(self, node: &str) -> Self {
        self.vms.lock().unwrap().remove(node);
        self
    }

    pub fn fail_actions(self) -> Self {
        *self.fail_actions.lock().unwrap() = true;
        self
    }

    pub fn wake_uncertain(self) -> Self {
        *self.wake_uncertain.lock().unwrap() = true;
        self
    }

    pub fn set_status(&self, id: &VmIdentity, status: &str) {
        self.find_mut(id, |vm| vm.status = VmPowerStatus::from(status));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// 以 `prefix` 开头的调用次数
    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    /// 控制类调用 (start/shutdown/stop) 的次数
    pub fn power_calls(&self) -> usize {
        self.count("start ") + self.count("shutdown ") + self.count("stop ")
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn find_mut<R>(&self, id: &VmIdentity, f: impl FnOnce(&mut VmObserved) -> R) -> Option<R> {
        let mut vms = self.vms.lock().unwrap();
        vms.get_mut(&id.node)?
            .iter_mut()
            .find(|vm| vm.identity == *id)
            .map(f)
    }

    fn power(&self, verb: &str, id: &VmIdentity, to: Option<&str>) -> Result<()> {
        self.record(format!("{} {}", verb, id));
        if *self.fail_actions.lock().unwrap() {
            return Err(Error::GatewayUnreachable(format!("{} {} 超时", verb, id)));
        }
        let found = self.find_mut(id, |vm| {
            if let Some(status) = to {
                vm.status = VmPowerStatus::from(status);
            }
        });
        found.ok_or_else(|| Error::GatewayUnreachable(format!("虚拟机 {} 不存在", id)))
    }
}

#[async_trait]
impl HypervisorGateway for FakeHypervisor {
    async fn list_nodes(&self) -> Result<Vec<NodeObserved>> {
        self.record("list_nodes".to_string());
        self.nodes
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::GatewayUnreachable("请求 /nodes 超时".to_string()))
    }

    async fn list_vms(&self, node: &str) -> Result<Vec<VmObserved>> {
        self.record(format!("list_vms {}", node));
        self.vms
            .lock()
            .unwrap()
            .get(node)
            .cloned()
            .ok_or_else(|| Error::GatewayUnreachable(format!("节点 {} 无响应", node)))
    }

    async fn vm_status(&self, id: &VmIdentity) -> Result<VmObserved> {
        self.record(format!("vm_status {}", id));
        self.find_mut(id, |vm| vm.clone())
            .ok_or_else(|| Error::GatewayUnreachable(format!("虚拟机 {} 不存在", id)))
    }

    async fn start(&self, id: &VmIdentity) -> Result<()> {
        self.power("start", id, Some("running"))
    }

    async fn shutdown(&self, id: &VmIdentity) -> Result<()> {
        // ACPI 关机是异步的，虚拟机保持运行状态
        self.power("shutdown", id, None)
    }

    async fn force_stop(&self, id: &VmIdentity) -> Result<()> {
        self.power("stop", id, Some("stopped"))
    }

    async fn wake_on_lan(&self, relay: &str, target: &str) -> Result<WakeReceipt> {
        self.record(format!("wake {}->{}", relay, target));
        Ok(WakeReceipt {
            relay: relay.to_string(),
            target: target.to_string(),
            mac_address: None,
            uncertain: *self.wake_uncertain.lock().unwrap(),
        })
    }

    async fn guest_network_interfaces(&self, id: &VmIdentity) -> Result<Vec<Ipv4Addr>> {
        self.record(format!("agent {}", id));
        self.ips
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::GatewayUnreachable("QEMU guest agent is not running".to_string()))
    }
}
