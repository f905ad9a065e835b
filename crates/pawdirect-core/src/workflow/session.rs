//! P2P 会话
//!
//! 面向调用方（桥接层 / 守护进程）的完整操作面：服务广播与发现、
//! 组生命周期、文件与消息的收发。
//!
//! # 资源策略
//!
//! 每进程同一时刻最多一条广播记录、一个发现会话、一个传输作业。
//! 启动第二个传输作业会被显式拒绝（`LinkBusy`），不会悄悄并发。
//! 传输作业在各自的后台任务中阻塞，绝不阻塞发起调用的任务。

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::sync::{Arc, Mutex};

use log::{debug, info};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::AppSettings;
use crate::directory::{DiscoveryEvent, SERVICE_INSTANCE, SERVICE_TYPE, ServiceDirectory};
use crate::error::{P2pError, Result, SocketErrorKind};
use crate::link::{
    ConnectConfig, ConnectionInfo, GroupInfo, LinkEvent, LinkProvider, PeerDevice, ServiceRecord,
};
use crate::orchestrator::{ConnectionOrchestrator, P2pState, Role};
use crate::transfer::server::ReceiveNotify;
use crate::transfer::{
    TransferClient, TransferJob, TransferOutcome, TransferPayload, TransferServer,
};

/// 会话选项
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// 设备名称（作为广播属性下发）
    pub device_name: String,
    /// 文件接收目录
    pub download_dir: std::path::PathBuf,
    /// 传输端口
    pub transfer_port: u16,
    /// 组主意向提示
    pub group_owner_intent: Option<u8>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&AppSettings::default())
    }
}

impl From<&AppSettings> for SessionOptions {
    fn from(settings: &AppSettings) -> Self {
        Self {
            device_name: settings.device_name.clone(),
            download_dir: settings.download_dir.clone(),
            transfer_port: settings.transfer_port,
            group_owner_intent: settings.group_owner_intent,
        }
    }
}

/// P2P 会话
///
/// 必须在 tokio 运行时内创建。
pub struct P2pSession {
    link: Arc<dyn LinkProvider>,
    directory: ServiceDirectory,
    orchestrator: ConnectionOrchestrator,
    options: SessionOptions,
    active_job: Arc<Mutex<Option<Uuid>>>,
    receive_cancel: Mutex<Option<CancellationToken>>,
    notify: Option<ReceiveNotify>,
}

/// 作业占位，Drop 时释放
struct JobGuard {
    slot: Arc<Mutex<Option<Uuid>>>,
    id: Uuid,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap();
        if *slot == Some(self.id) {
            *slot = None;
        }
    }
}

impl P2pSession {
    pub fn new(link: Arc<dyn LinkProvider>, options: SessionOptions) -> Self {
        let directory = ServiceDirectory::new(link.clone());
        let orchestrator = ConnectionOrchestrator::new(link.clone());
        Self {
            link,
            directory,
            orchestrator,
            options,
            active_job: Arc::new(Mutex::new(None)),
            receive_cancel: Mutex::new(None),
            notify: None,
        }
    }

    /// 设置文件接收成功后的通知钩子（媒体库重扫的挂接点）
    pub fn with_receive_notify(mut self, notify: ReceiveNotify) -> Self {
        self.notify = Some(notify);
        self
    }

    // ---- 服务目录 ----

    /// 广播本进程的服务记录
    ///
    /// 属性表由调用方提供，设备名称在缺省时自动补充。
    pub async fn advertise(&self, mut attributes: HashMap<String, String>) -> Result<()> {
        attributes
            .entry("deviceName".to_string())
            .or_insert_with(|| self.options.device_name.clone());

        let mut record = ServiceRecord::new(SERVICE_INSTANCE, SERVICE_TYPE);
        record.attributes = attributes;
        self.directory.advertise(record).await
    }

    /// 开始服务发现，返回事件流
    pub async fn discover_services(&self) -> Result<ReceiverStream<DiscoveryEvent>> {
        self.directory.discover(SERVICE_TYPE).await
    }

    // ---- 连接编排 ----

    pub async fn discover_peers(&self) -> Result<()> {
        self.orchestrator.discover_peers().await
    }

    pub async fn stop_peer_discovery(&self) -> Result<()> {
        self.orchestrator.stop_peer_discovery().await
    }

    /// 请求与指定对端组成 P2P 组，组主意向取自会话选项
    pub async fn connect(&self, device_address: &str) -> Result<()> {
        let mut config = ConnectConfig::new(device_address);
        config.group_owner_intent = self.options.group_owner_intent;
        self.connect_with_config(config).await
    }

    pub async fn connect_with_config(&self, config: ConnectConfig) -> Result<()> {
        self.orchestrator.connect(config).await
    }

    pub async fn cancel_connect(&self) -> Result<()> {
        self.orchestrator.cancel_connect().await
    }

    pub async fn create_group(&self) -> Result<()> {
        self.orchestrator.create_group().await
    }

    pub async fn remove_group(&self) -> Result<()> {
        self.orchestrator.remove_group().await
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        self.orchestrator.current_connection_info()
    }

    pub fn subscribe_connection_info(&self) -> watch::Receiver<ConnectionInfo> {
        self.orchestrator.subscribe_connection_info()
    }

    pub fn role(&self) -> Role {
        self.orchestrator.role()
    }

    pub fn state(&self) -> P2pState {
        self.orchestrator.state()
    }

    pub async fn group_info(&self) -> Result<Option<GroupInfo>> {
        self.orchestrator.current_group_info().await
    }

    pub async fn peer_list(&self) -> Result<Vec<PeerDevice>> {
        self.orchestrator.current_peer_list().await
    }

    /// 订阅链路层推送事件（对端更新、组成员关系更新、本机设备变化等）
    pub fn subscribe_events(&self) -> broadcast::Receiver<LinkEvent> {
        self.link.subscribe()
    }

    // ---- 传输 ----

    /// 发送文件到当前组主
    pub async fn send_file(&self, path: &Path) -> Result<TransferOutcome> {
        let host = self.require_host_address()?;
        self.send_file_to(path, host).await
    }

    /// 发送文件到指定地址
    pub async fn send_file_to(&self, path: &Path, address: IpAddr) -> Result<TransferOutcome> {
        let job = TransferJob::new(
            TransferPayload::File(path.to_path_buf()),
            address,
            self.options.transfer_port,
        );
        let _guard = self.claim_job(&job)?;

        let client = TransferClient::new(address, self.options.transfer_port);
        client.send_file(path).await
    }

    /// 发送消息到当前组主
    pub async fn send_message(&self, text: &str) -> Result<TransferOutcome> {
        let host = self.require_host_address()?;
        self.send_message_to(text, host).await
    }

    /// 发送消息到指定地址
    pub async fn send_message_to(&self, text: &str, address: IpAddr) -> Result<TransferOutcome> {
        let job = TransferJob::new(
            TransferPayload::Message(text.to_string()),
            address,
            self.options.transfer_port,
        );
        let _guard = self.claim_job(&job)?;

        let client = TransferClient::new(address, self.options.transfer_port);
        client.send_message(text).await
    }

    /// 接收一个文件，保存为下载目录下的 `file_name`
    ///
    /// 只能在组已形成且本机为组主时调用。
    pub async fn receive_file(&self, file_name: &str) -> Result<TransferOutcome> {
        self.require_host_role()?;

        let destination = self.options.download_dir.join(file_name);
        let job = TransferJob::new(
            TransferPayload::File(destination.clone()),
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            self.options.transfer_port,
        );
        let _guard = self.claim_job(&job)?;

        let mut server = TransferServer::bind(self.options.transfer_port).await?;
        if let Some(notify) = &self.notify {
            server = server.with_receive_notify(notify.clone());
        }

        self.run_cancellable(server.receive_file(destination)).await
    }

    /// 接收一条消息
    ///
    /// 只能在组已形成且本机为组主时调用。
    pub async fn receive_message(&self) -> Result<TransferOutcome> {
        self.require_host_role()?;

        let job = TransferJob::new(
            TransferPayload::Message(String::new()),
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            self.options.transfer_port,
        );
        let _guard = self.claim_job(&job)?;

        let server = TransferServer::bind(self.options.transfer_port).await?;
        self.run_cancellable(server.receive_message()).await
    }

    /// 关闭进行中的接收作业的监听套接字
    ///
    /// 挂起的 `receive_*` 调用确定性地以套接字错误终结，绝不悬挂。
    /// 没有进行中的接收时是无操作。
    pub fn stop_receiving(&self) {
        if let Some(token) = self.receive_cancel.lock().unwrap().take() {
            info!("Cancelling pending receive job");
            token.cancel();
        }
    }

    // ---- 内部 ----

    async fn run_cancellable(
        &self,
        job: impl Future<Output = Result<TransferOutcome>>,
    ) -> Result<TransferOutcome> {
        let token = CancellationToken::new();
        *self.receive_cancel.lock().unwrap() = Some(token.clone());

        let result = tokio::select! {
            outcome = job => outcome,
            () = token.cancelled() => Err(P2pError::socket(
                SocketErrorKind::Io,
                io::Error::new(io::ErrorKind::Interrupted, "receive cancelled"),
            )),
        };

        self.receive_cancel.lock().unwrap().take();
        result
    }

    /// 组主地址，组未形成时报 `ConnectionNotFormed`
    fn require_host_address(&self) -> Result<IpAddr> {
        self.orchestrator
            .host_address()
            .ok_or(P2pError::ConnectionNotFormed)
    }

    /// 传输服务端的前置条件：组已形成且本机为组主
    fn require_host_role(&self) -> Result<()> {
        let info = self.orchestrator.current_connection_info();
        if !info.group_formed || !info.is_host {
            return Err(P2pError::ConnectionNotFormed);
        }
        Ok(())
    }

    /// 占用唯一的传输作业槽位，已占用时显式拒绝
    fn claim_job(&self, job: &TransferJob) -> Result<JobGuard> {
        let mut slot = self.active_job.lock().unwrap();
        if slot.is_some() {
            debug!("Rejecting transfer job {}: another job is active", job.id);
            return Err(P2pError::LinkBusy);
        }
        *slot = Some(job.id);
        debug!("Transfer job {} started", job.id);
        Ok(JobGuard {
            slot: self.active_job.clone(),
            id: job.id,
        })
    }
}
