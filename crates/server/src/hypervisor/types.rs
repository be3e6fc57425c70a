/// Proxmox API 报文类型

use common::{NodeObserved, VmIdentity, VmObserved, VmPowerStatus};
use serde::{Deserialize, Deserializer};
use std::net::Ipv4Addr;

/// Proxmox 所有响应都包在 `data` 字段里
#[derive(Debug, Deserialize)]
pub struct ResponseBase<T> {
    pub data: T,
}

/// `POST /access/ticket` 返回
#[derive(Debug, Clone, Deserialize)]
pub struct TicketResponse {
    pub ticket: String,
    #[serde(rename = "CSRFPreventionToken")]
    pub csrf_token: String,
    pub username: String,
}

/// `GET /nodes` 条目
#[derive(Debug, Deserialize)]
pub struct NodeEntry {
    pub node: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl NodeEntry {
    /// 集群明确报告 offline 时视为不可达
    pub fn into_observed(self) -> NodeObserved {
        let reachable = !matches!(self.status.as_deref(), Some("offline"));
        NodeObserved {
            name: self.node,
            reachable,
        }
    }
}

/// `GET /nodes/{node}/qemu` 与 `.../status/current` 条目
#[derive(Debug, Deserialize)]
pub struct QemuEntry {
    #[serde(deserialize_with = "number_or_string")]
    pub vmid: u32,
    #[serde(default)]
    pub name: Option<String>,
    pub status: String,
    #[serde(default)]
    pub template: Option<serde_json::Value>,
}

impl QemuEntry {
    pub fn is_template(&self) -> bool {
        match &self.template {
            Some(serde_json::Value::Number(n)) => n.as_u64() == Some(1),
            Some(serde_json::Value::String(s)) => s == "1",
            Some(serde_json::Value::Bool(b)) => *b,
            _ => false,
        }
    }

    pub fn into_observed(self, node: &str) -> VmObserved {
        let template = self.is_template();
        let name = self
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("VM {}", self.vmid));
        VmObserved {
            identity: VmIdentity::new(node, self.vmid),
            name,
            status: VmPowerStatus::from(self.status),
            template,
        }
    }
}

fn number_or_string<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// `GET .../agent/network-get-interfaces` 返回
#[derive(Debug, Default, Deserialize)]
pub struct AgentInterfaces {
    #[serde(default)]
    pub result: Vec<AgentInterface>,
}

#[derive(Debug, Deserialize)]
pub struct AgentInterface {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "ip-addresses", default)]
    pub ip_addresses: Vec<AgentIpAddress>,
}

#[derive(Debug, Deserialize)]
pub struct AgentIpAddress {
    #[serde(rename = "ip-address")]
    pub ip_address: String,
    #[serde(rename = "ip-address-type")]
    pub ip_address_type: String,
}

impl AgentInterfaces {
    /// 提取 IPv4 地址，跳过 lo 接口和 127.0.0.1
    pub fn ipv4_addresses(&self) -> Vec<Ipv4Addr> {
        self.result
            .iter()
            .filter(|iface| iface.name != "lo")
            .flat_map(|iface| iface.ip_addresses.iter())
            .filter(|ip| ip.ip_address_type == "ipv4")
            .filter_map(|ip| ip.ip_address.parse::<Ipv4Addr>().ok())
            .filter(|ip| *ip != Ipv4Addr::LOCALHOST)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_entry_reachability() {
        let rsp: ResponseBase<Vec<NodeEntry>> = serde_json::from_value(json!({
            "data": [
                {"node": "alpha", "status": "online"},
                {"node": "beta", "status": "offline"},
                {"node": "gamma"}
            ]
        }))
        .unwrap();

        let nodes: Vec<NodeObserved> = rsp.data.into_iter().map(NodeEntry::into_observed).collect();
        assert_eq!(
            nodes,
            vec![
                NodeObserved::reachable("alpha"),
                NodeObserved::unreachable("beta"),
                NodeObserved::reachable("gamma"),
            ]
        );
    }

    #[test]
    fn test_qemu_entry_parsing() {
        let rsp: ResponseBase<Vec<QemuEntry>> = serde_json::from_value(json!({
            "data": [
                {"vmid": 100, "name": "web", "status": "running", "cpus": 2},
                {"vmid": "101", "status": "stopped", "template": 1},
                {"vmid": 102, "name": "", "status": "paused"}
            ]
        }))
        .unwrap();

        let vms: Vec<VmObserved> = rsp
            .data
            .into_iter()
            .map(|e| e.into_observed("alpha"))
            .collect();

        assert_eq!(vms[0].identity, VmIdentity::new("alpha", 100));
        assert_eq!(vms[0].status, VmPowerStatus::Running);
        assert!(!vms[0].template);
        assert_eq!(vms[1].name, "VM 101");
        assert!(vms[1].template);
        assert_eq!(vms[2].name, "VM 102");
        assert_eq!(vms[2].status, VmPowerStatus::Other("paused".to_string()));
    }

    #[test]
    fn test_agent_ipv4_extraction() {
        let rsp: ResponseBase<AgentInterfaces> = serde_json::from_value(json!({
            "data": {
                "result": [
                    {
                        "name": "lo",
                        "ip-addresses": [
                            {"ip-address": "127.0.0.1", "ip-address-type": "ipv4", "prefix": 8}
                        ]
                    },
                    {
                        "name": "eth0",
                        "hardware-address": "bc:24:11:00:00:01",
                        "ip-addresses": [
                            {"ip-address": "192.168.10.21", "ip-address-type": "ipv4", "prefix": 24},
                            {"ip-address": "fe80::1", "ip-address-type": "ipv6", "prefix": 64}
                        ]
                    },
                    {
                        "name": "docker0",
                        "ip-addresses": [
                            {"ip-address": "172.17.0.1", "ip-address-type": "ipv4", "prefix": 16},
                            {"ip-address": "127.0.0.1", "ip-address-type": "ipv4", "prefix": 8}
                        ]
                    },
                    {"name": "eth1"}
                ]
            }
        }))
        .unwrap();

        assert_eq!(
            rsp.data.ipv4_addresses(),
            vec![
                Ipv4Addr::new(192, 168, 10, 21),
                Ipv4Addr::new(172, 17, 0, 1),
            ]
        );
    }

    #[test]
    fn test_ticket_response() {
        let rsp: ResponseBase<TicketResponse> = serde_json::from_value(json!({
            "data": {
                "ticket": "PVE:root@pam:ABC",
                "CSRFPreventionToken": "65A:xyz",
                "username": "root@pam",
                "cap": {}
            }
        }))
        .unwrap();
        assert_eq!(rsp.data.csrf_token, "65A:xyz");
        assert_eq!(rsp.data.username, "root@pam");
    }
}
