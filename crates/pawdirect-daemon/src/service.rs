//! Core Service - 平台链路接入点

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use pawdirect_core::{
    ConnectConfig, ConnectionInfo, GroupInfo, LinkEvent, LinkProvider, P2pError, PeerDevice,
    ServiceRecord,
};
use tokio::sync::broadcast;

/// 守护进程使用的链路提供者
///
/// 平台无线栈的接入点。在接好具体后端之前，所有操作上报链路不可用，
/// 事件通道保持打开但不会产生事件。
// TODO: 通过 wpa_ctrl 接入 wpa_supplicant 的 P2P 控制接口
pub struct DaemonLink {
    events: broadcast::Sender<LinkEvent>,
}

impl DaemonLink {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self { events }
    }
}

impl Default for DaemonLink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkProvider for DaemonLink {
    async fn discover_peers(&self) -> pawdirect_core::Result<()> {
        Err(P2pError::LinkUnavailable)
    }

    async fn stop_peer_discovery(&self) -> pawdirect_core::Result<()> {
        Err(P2pError::LinkUnavailable)
    }

    async fn clear_advertised_services(&self) -> pawdirect_core::Result<()> {
        Err(P2pError::LinkUnavailable)
    }

    async fn advertise_service(&self, _record: ServiceRecord) -> pawdirect_core::Result<()> {
        Err(P2pError::LinkUnavailable)
    }

    async fn add_service_request(&self, _service_type: &str) -> pawdirect_core::Result<()> {
        Err(P2pError::LinkUnavailable)
    }

    async fn remove_service_request(&self, _service_type: &str) -> pawdirect_core::Result<()> {
        Err(P2pError::LinkUnavailable)
    }

    async fn discover_services(&self) -> pawdirect_core::Result<()> {
        Err(P2pError::LinkUnavailable)
    }

    async fn form_group(&self, _config: &ConnectConfig) -> pawdirect_core::Result<()> {
        Err(P2pError::LinkUnavailable)
    }

    async fn create_group(&self) -> pawdirect_core::Result<()> {
        Err(P2pError::LinkUnavailable)
    }

    async fn remove_group(&self) -> pawdirect_core::Result<()> {
        Err(P2pError::LinkUnavailable)
    }

    async fn cancel_connect(&self) -> pawdirect_core::Result<()> {
        Err(P2pError::LinkUnavailable)
    }

    async fn connection_info(&self) -> pawdirect_core::Result<ConnectionInfo> {
        Ok(ConnectionInfo::default())
    }

    async fn group_info(&self) -> pawdirect_core::Result<Option<GroupInfo>> {
        Ok(None)
    }

    async fn peer_list(&self) -> pawdirect_core::Result<Vec<PeerDevice>> {
        Ok(Vec::new())
    }

    fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }
}

pub async fn run_service(link: Arc<DaemonLink>) -> Result<()> {
    tracing::info!("Core service initializing...");

    // 获取 P2P 接口 MAC 地址
    let mac = get_p2p_mac().unwrap_or_else(|| "02:00:00:00:00:00".to_string());
    tracing::info!("P2P interface MAC: {}", mac);
    tracing::info!("Waiting for IPC commands...");

    // 把链路层事件写进日志，便于排查组建立过程
    let mut events = link.subscribe();
    loop {
        match events.recv().await {
            Ok(LinkEvent::ConnectionChanged(info)) => {
                tracing::info!(
                    "Connection changed: formed={} host={}",
                    info.group_formed,
                    info.is_host
                );
            }
            Ok(LinkEvent::PeersChanged(peers)) => {
                tracing::info!("Peer list changed: {} peer(s)", peers.len());
            }
            Ok(event) => {
                tracing::debug!("Link event: {:?}", event);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Link event stream lagged, {} event(s) dropped", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    Ok(())
}

fn get_p2p_mac() -> Option<String> {
    // 尝试读取 p2p0 接口的 MAC 地址
    for iface in &["p2p0", "wlan0", "wlp2s0"] {
        let path = format!("/sys/class/net/{}/address", iface);
        if let Ok(mac) = std::fs::read_to_string(&path) {
            return Some(mac.trim().to_uppercase());
        }
    }
    None
}
