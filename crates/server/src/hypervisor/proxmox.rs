/// Proxmox VE REST API 客户端
///
/// https://pve.proxmox.com/pve-docs/api-viewer/

use async_trait::async_trait;
use common::{Error, NodeObserved, Result, VmIdentity, VmObserved};
use reqwest::{header, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::types::{AgentInterfaces, NodeEntry, QemuEntry, ResponseBase, TicketResponse};
use super::{HypervisorGateway, WakeReceipt};
use crate::config::ProxmoxConfig;

/// Proxmox 票据有效期为 2 小时，提前续期
const TICKET_RENEW_AFTER: Duration = Duration::from_secs(90 * 60);

/// 代理到目标节点失败时 Proxmox 返回的状态码
const PVE_PROXY_ERROR: u16 = 595;

enum ProxmoxAuth {
    Token(String),
    Password { user: String, password: String },
}

struct CachedTicket {
    ticket: TicketResponse,
    issued_at: Instant,
}

pub struct ProxmoxClient {
    http: reqwest::Client,
    base: String,
    auth: ProxmoxAuth,
    ticket: RwLock<Option<CachedTicket>>,
}

impl ProxmoxClient {
    pub fn new(cfg: &ProxmoxConfig) -> Result<Self> {
        let timeout = Duration::from_secs(cfg.timeout_secs);
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!cfg.verify_ssl)
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("无法创建 HTTP 客户端: {}", e)))?;

        let auth = match (&cfg.token, &cfg.password) {
            (Some(token), _) => ProxmoxAuth::Token(token.clone()),
            (None, Some(password)) => ProxmoxAuth::Password {
                user: cfg.user.clone(),
                password: password.clone(),
            },
            (None, None) => {
                return Err(Error::Config(
                    "proxmox.password 与 proxmox.token 至少需要配置一个".to_string(),
                ))
            }
        };

        if !cfg.verify_ssl {
            warn!("⚠️ 未启用 Proxmox 证书校验");
        }

        Ok(Self {
            http,
            base: format!("https://{}:{}/api2/json", cfg.host, cfg.port),
            auth,
            ticket: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// 获取票据：缓存未过期时直接使用，否则重新登录
    async fn ticket(&self, user: &str, password: &str) -> Result<TicketResponse> {
        {
            let cached = self.ticket.read().await;
            if let Some(cached) = cached.as_ref() {
                if cached.issued_at.elapsed() < TICKET_RENEW_AFTER {
                    return Ok(cached.ticket.clone());
                }
            }
        }

        let ticket = self.login(user, password).await?;
        let mut cached = self.ticket.write().await;
        *cached = Some(CachedTicket {
            ticket: ticket.clone(),
            issued_at: Instant::now(),
        });
        Ok(ticket)
    }

    async fn login(&self, user: &str, password: &str) -> Result<TicketResponse> {
        debug!("登录 Proxmox: {}", user);
        let rsp = self
            .http
            .post(format!("{}/access/ticket", self.base))
            .form(&[("username", user), ("password", password)])
            .send()
            .await
            .map_err(|e| transport_error("/access/ticket", e))?;

        let rsp: ResponseBase<TicketResponse> = check_status("/access/ticket", rsp)?
            .json()
            .await
            .map_err(|e| transport_error("/access/ticket", e))?;

        info!("✅ Proxmox 登录成功: {}", rsp.data.username);
        Ok(rsp.data)
    }

    /// 发送请求并附加认证信息，不检查响应状态
    async fn send(&self, method: Method, path: &str) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base, path);
        let mut req = self.http.request(method.clone(), url);

        match &self.auth {
            ProxmoxAuth::Token(token) => {
                req = req.header(header::AUTHORIZATION, format!("PVEAPIToken={}", token));
            }
            ProxmoxAuth::Password { user, password } => {
                let ticket = self.ticket(user, password).await?;
                req = req.header(header::COOKIE, format!("PVEAuthCookie={}", ticket.ticket));
                if method != Method::GET {
                    req = req.header("CSRFPreventionToken", ticket.csrf_token);
                }
            }
        }

        if method == Method::POST {
            req = req.form(&Vec::<(String, String)>::new());
        }

        debug!("📤 [Proxmox] {} {}", method, path);
        let rsp = req.send().await.map_err(|e| transport_error(path, e))?;

        if rsp.status() == StatusCode::UNAUTHORIZED {
            // 票据可能已失效，下次请求重新登录
            self.ticket.write().await.take();
        }

        Ok(rsp)
    }

    async fn call<T: DeserializeOwned>(&self, method: Method, path: &str) -> Result<T> {
        let rsp = self.send(method, path).await?;
        let rsp: ResponseBase<T> = check_status(path, rsp)?
            .json()
            .await
            .map_err(|e| transport_error(path, e))?;
        Ok(rsp.data)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.call(Method::GET, path).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.call(Method::POST, path).await
    }

    async fn vm_power(&self, id: &VmIdentity, command: &str) -> Result<()> {
        let path = format!("/nodes/{}/qemu/{}/status/{}", id.node, id.vmid, command);
        let upid: Option<String> = self.post(&path).await?;
        info!("⚡ [Proxmox] {} {} 已提交, task={:?}", command, id, upid);
        Ok(())
    }
}

fn transport_error(path: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::GatewayUnreachable(format!("{} 请求超时", path))
    } else if e.is_connect() {
        Error::GatewayUnreachable(format!("{} 连接失败: {}", path, e))
    } else {
        Error::GatewayUnreachable(format!("{}: {}", path, e))
    }
}

fn check_status(path: &str, rsp: reqwest::Response) -> Result<reqwest::Response> {
    let status = rsp.status();
    if status.is_success() {
        return Ok(rsp);
    }
    let reason = status.canonical_reason().unwrap_or("Unknown");
    Err(Error::GatewayUnreachable(format!(
        "{} 返回 {} {}",
        path,
        status.as_u16(),
        reason
    )))
}

#[async_trait]
impl HypervisorGateway for ProxmoxClient {
    async fn list_nodes(&self) -> Result<Vec<NodeObserved>> {
        let nodes: Vec<NodeEntry> = self.get("/nodes").await?;
        Ok(nodes.into_iter().map(NodeEntry::into_observed).collect())
    }

    async fn list_vms(&self, node: &str) -> Result<Vec<VmObserved>> {
        let entries: Vec<QemuEntry> = self.get(&format!("/nodes/{}/qemu", node)).await?;
        let mut vms: Vec<VmObserved> = entries
            .into_iter()
            .map(|e| e.into_observed(node))
            .collect();
        vms.sort_by_key(|vm| vm.identity.vmid);
        Ok(vms)
    }

    async fn vm_status(&self, id: &VmIdentity) -> Result<VmObserved> {
        let entry: QemuEntry = self
            .get(&format!("/nodes/{}/qemu/{}/status/current", id.node, id.vmid))
            .await?;
        Ok(entry.into_observed(&id.node))
    }

    async fn start(&self, id: &VmIdentity) -> Result<()> {
        self.vm_power(id, "start").await
    }

    async fn shutdown(&self, id: &VmIdentity) -> Result<()> {
        self.vm_power(id, "shutdown").await
    }

    async fn force_stop(&self, id: &VmIdentity) -> Result<()> {
        self.vm_power(id, "stop").await
    }

    /// `POST /nodes/{target}/wakeonlan` 由接收请求的 API 主机在本地执行，
    /// 因此唤醒包由配置的 API 主机（即中继节点）发出。
    async fn wake_on_lan(&self, relay: &str, target: &str) -> Result<WakeReceipt> {
        let path = format!("/nodes/{}/wakeonlan", target);
        info!("⚡ [Proxmox] 经由 {} 唤醒节点 {}", relay, target);

        let rsp = self.send(Method::POST, &path).await?;
        if rsp.status().as_u16() == PVE_PROXY_ERROR {
            warn!("WOL 请求返回 {}，唤醒包可能已发出: {}", PVE_PROXY_ERROR, target);
            return Ok(WakeReceipt {
                relay: relay.to_string(),
                target: target.to_string(),
                mac_address: None,
                uncertain: true,
            });
        }

        let rsp: ResponseBase<Option<String>> = check_status(&path, rsp)?
            .json()
            .await
            .map_err(|e| transport_error(&path, e))?;

        Ok(WakeReceipt {
            relay: relay.to_string(),
            target: target.to_string(),
            mac_address: rsp.data,
            uncertain: false,
        })
    }

    async fn guest_network_interfaces(&self, id: &VmIdentity) -> Result<Vec<Ipv4Addr>> {
        let interfaces: AgentInterfaces = self
            .get(&format!(
                "/nodes/{}/qemu/{}/agent/network-get-interfaces",
                id.node, id.vmid
            ))
            .await?;
        Ok(interfaces.ipv4_addresses())
    }
}
