//! 连接编排器
//!
//! 驱动从"无组"到"已连接且角色确定"的状态机：
//!
//! ```text
//! Idle → PeerDiscoveryActive → Connecting → Connected(role) → Disconnecting → Idle
//!                                               ↓ 链路层拆除
//!                                          Disconnected
//! ```
//!
//! # 角色判定
//!
//! 角色只从 [`ConnectionInfo`] 派生，绝不单独缓存，也不从组主意向提示或
//! 套接字连接成败推断。编排器内部只有一个订阅任务写入缓存
//! （单写者），传输组件启动前原子地读取最近一次的值。

use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::error::{P2pError, Result};
use crate::link::{ConnectConfig, ConnectionInfo, GroupInfo, LinkEvent, LinkProvider, PeerDevice};

/// 本机在组内的角色，由 ConnectionInfo 派生
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// 组未形成，角色未定
    Undetermined,
    /// 组主，负责接受传输连接
    Host,
    /// 组员，传输的发起方
    Client,
}

impl Role {
    fn from_info(info: &ConnectionInfo) -> Self {
        if !info.group_formed {
            Role::Undetermined
        } else if info.is_host {
            Role::Host
        } else {
            Role::Client
        }
    }
}

/// 编排器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum P2pState {
    Idle,
    PeerDiscoveryActive,
    Connecting,
    Connected(Role),
    Disconnecting,
    /// 链路层拆除导致的断开，与主动解散区分
    Disconnected,
}

/// 连接编排器
///
/// 必须在 tokio 运行时内创建（内部会派生订阅任务）。
pub struct ConnectionOrchestrator {
    link: Arc<dyn LinkProvider>,
    state: Arc<Mutex<P2pState>>,
    info_rx: watch::Receiver<ConnectionInfo>,
    watcher: JoinHandle<()>,
}

impl ConnectionOrchestrator {
    pub fn new(link: Arc<dyn LinkProvider>) -> Self {
        let (info_tx, info_rx) = watch::channel(ConnectionInfo::default());
        let state = Arc::new(Mutex::new(P2pState::Idle));

        let mut events = link.subscribe();
        let watcher_state = state.clone();
        let watcher = tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Connection watcher lagged, {} events dropped", n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if let LinkEvent::ConnectionChanged(next) = event {
                    debug!(
                        "Connection info updated: formed={}, host={}, address={:?}",
                        next.group_formed, next.is_host, next.host_address
                    );
                    {
                        let mut state = watcher_state.lock().unwrap();
                        if next.group_formed {
                            *state = P2pState::Connected(Role::from_info(&next));
                        } else {
                            *state = match *state {
                                P2pState::Connected(_) => P2pState::Disconnected,
                                P2pState::Disconnecting => P2pState::Idle,
                                other => other,
                            };
                        }
                    }
                    // 唯一的写入点，按链路层上报顺序投递
                    let _ = info_tx.send(next);
                }
            }
        });

        Self {
            link,
            state,
            info_rx,
            watcher,
        }
    }

    /// 当前状态
    pub fn state(&self) -> P2pState {
        *self.state.lock().unwrap()
    }

    /// 当前角色，组未形成时为 [`Role::Undetermined`]
    pub fn role(&self) -> Role {
        Role::from_info(&self.info_rx.borrow())
    }

    /// 最近一次链路层上报的组成员关系信息（拉取式查询走缓存）
    pub fn current_connection_info(&self) -> ConnectionInfo {
        self.info_rx.borrow().clone()
    }

    /// 订阅组成员关系变化
    pub fn subscribe_connection_info(&self) -> watch::Receiver<ConnectionInfo> {
        self.info_rx.clone()
    }

    /// 组主地址，组未形成时为 None
    pub fn host_address(&self) -> Option<std::net::IpAddr> {
        let info = self.info_rx.borrow();
        if info.group_formed { info.host_address } else { None }
    }

    /// 开始对端扫描
    ///
    /// 已经处于扫描状态时幂等返回。
    pub async fn discover_peers(&self) -> Result<()> {
        if matches!(self.state(), P2pState::PeerDiscoveryActive) {
            return Ok(());
        }
        self.link.discover_peers().await?;

        let mut state = self.state.lock().unwrap();
        if matches!(
            *state,
            P2pState::Idle | P2pState::Connected(_) | P2pState::Disconnected
        ) {
            *state = P2pState::PeerDiscoveryActive;
        }
        info!("Peer discovery active");
        Ok(())
    }

    /// 停止对端扫描
    pub async fn stop_peer_discovery(&self) -> Result<()> {
        self.link.stop_peer_discovery().await?;

        let mut state = self.state.lock().unwrap();
        if matches!(*state, P2pState::PeerDiscoveryActive) {
            let info = self.info_rx.borrow();
            *state = if info.group_formed {
                P2pState::Connected(Role::from_info(&info))
            } else {
                P2pState::Idle
            };
        }
        Ok(())
    }

    /// 请求与指定对端组成 P2P 组
    ///
    /// 已连接或正在连接时快速失败，绝不悄悄拆除现有的组。
    /// `group_owner_intent` 只是提示，最终角色以链路层读回为准。
    pub async fn connect(&self, config: ConnectConfig) -> Result<()> {
        // 成组事件可能先于请求回执到达，Connecting 必须在发起请求前占下，
        // 否则会覆盖订阅任务已经记下的 Connected
        let previous = {
            let mut state = self.state.lock().unwrap();
            match *state {
                P2pState::Connected(_) | P2pState::Connecting => return Err(P2pError::LinkBusy),
                other => {
                    *state = P2pState::Connecting;
                    other
                }
            }
        };

        info!(
            "Forming group with peer {} (owner intent: {:?})",
            config.device_address, config.group_owner_intent
        );
        if let Err(e) = self.link.form_group(&config).await {
            let mut state = self.state.lock().unwrap();
            if matches!(*state, P2pState::Connecting) {
                *state = previous;
            }
            return Err(e);
        }
        Ok(())
    }

    /// 取消进行中的连接请求
    ///
    /// 只在 `Connecting` 状态下有效，其余状态（包括重复取消）是无操作。
    pub async fn cancel_connect(&self) -> Result<()> {
        if !matches!(self.state(), P2pState::Connecting) {
            return Ok(());
        }
        self.link.cancel_connect().await?;
        *self.state.lock().unwrap() = P2pState::Idle;
        info!("Connection attempt cancelled");
        Ok(())
    }

    /// 主动建组，强制本机成为组主
    ///
    /// 组形成的确认通过 ConnectionInfo 推送到达。
    pub async fn create_group(&self) -> Result<()> {
        self.link.create_group().await
    }

    /// 解散当前组，无论先前处于什么状态都强制回到 `Idle`
    pub async fn remove_group(&self) -> Result<()> {
        let previous = {
            let mut state = self.state.lock().unwrap();
            let previous = *state;
            *state = P2pState::Disconnecting;
            previous
        };

        match self.link.remove_group().await {
            Ok(()) => {
                *self.state.lock().unwrap() = P2pState::Idle;
                info!("Group removed");
                Ok(())
            }
            Err(e) => {
                *self.state.lock().unwrap() = previous;
                Err(e)
            }
        }
    }

    /// 拉取当前组信息
    pub async fn current_group_info(&self) -> Result<Option<GroupInfo>> {
        self.link.group_info().await
    }

    /// 拉取当前对端列表
    pub async fn current_peer_list(&self) -> Result<Vec<PeerDevice>> {
        self.link.peer_list().await
    }
}

impl Drop for ConnectionOrchestrator {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}
