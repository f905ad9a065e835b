//! 测试用内存链路提供者

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::link::{
    ConnectConfig, ConnectionInfo, GroupInfo, LinkEvent, LinkProvider, PeerDevice, ReasonCode,
    ServiceRecord,
};

/// 内存实现的链路提供者
///
/// 记录每次调用的名称，事件由测试代码通过 [`FakeLink::emit`] 注入。
pub(crate) struct FakeLink {
    events: broadcast::Sender<LinkEvent>,
    pub calls: Mutex<Vec<String>>,
    pub records: Mutex<Vec<ServiceRecord>>,
    pub peers: Mutex<Vec<PeerDevice>>,
    pub info: Mutex<ConnectionInfo>,
    /// 设定后所有链路操作以该原因码失败
    pub fail_with: Mutex<Option<ReasonCode>>,
    /// 设定后 form_group 在回执之前就推送成组事件（模拟快链路）
    pub emit_formed_before_ack: Mutex<bool>,
}

impl FakeLink {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            events,
            calls: Mutex::new(Vec::new()),
            records: Mutex::new(Vec::new()),
            peers: Mutex::new(Vec::new()),
            info: Mutex::new(ConnectionInfo::default()),
            fail_with: Mutex::new(None),
            emit_formed_before_ack: Mutex::new(false),
        }
    }

    pub fn emit(&self, event: LinkEvent) {
        let _ = self.events.send(event);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record_call(&self, name: &str) -> Result<()> {
        self.calls.lock().unwrap().push(name.to_string());
        match *self.fail_with.lock().unwrap() {
            Some(reason) => Err(reason.into_error()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LinkProvider for FakeLink {
    async fn discover_peers(&self) -> Result<()> {
        self.record_call("discover_peers")
    }

    async fn stop_peer_discovery(&self) -> Result<()> {
        self.record_call("stop_peer_discovery")
    }

    async fn clear_advertised_services(&self) -> Result<()> {
        self.record_call("clear_advertised_services")?;
        self.records.lock().unwrap().clear();
        Ok(())
    }

    async fn advertise_service(&self, record: ServiceRecord) -> Result<()> {
        self.record_call("advertise_service")?;
        self.records.lock().unwrap().push(record);
        Ok(())
    }

    async fn add_service_request(&self, _service_type: &str) -> Result<()> {
        self.record_call("add_service_request")
    }

    async fn remove_service_request(&self, _service_type: &str) -> Result<()> {
        self.record_call("remove_service_request")
    }

    async fn discover_services(&self) -> Result<()> {
        self.record_call("discover_services")
    }

    async fn form_group(&self, _config: &ConnectConfig) -> Result<()> {
        self.record_call("form_group")?;
        if *self.emit_formed_before_ack.lock().unwrap() {
            self.emit(LinkEvent::ConnectionChanged(ConnectionInfo {
                group_formed: true,
                is_host: true,
                host_address: Some("192.168.49.1".parse().unwrap()),
            }));
            // 让订阅任务先处理该事件，回执在成组之后才返回
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    async fn create_group(&self) -> Result<()> {
        self.record_call("create_group")
    }

    async fn remove_group(&self) -> Result<()> {
        self.record_call("remove_group")
    }

    async fn cancel_connect(&self) -> Result<()> {
        self.record_call("cancel_connect")
    }

    async fn connection_info(&self) -> Result<ConnectionInfo> {
        self.record_call("connection_info")?;
        Ok(self.info.lock().unwrap().clone())
    }

    async fn group_info(&self) -> Result<Option<GroupInfo>> {
        self.record_call("group_info")?;
        Ok(None)
    }

    async fn peer_list(&self) -> Result<Vec<PeerDevice>> {
        self.record_call("peer_list")?;
        Ok(self.peers.lock().unwrap().clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }
}
