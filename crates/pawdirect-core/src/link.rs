//! 链路提供者接口
//!
//! 底层设备对设备的无线链路栈（扫描、服务广播、组建立）被视为外部依赖，
//! 本模块只定义其接口和数据模型。具体平台实现（wpa_supplicant、
//! NetworkManager 等）在核心库之外注入。
//!
//! # 事件模型
//!
//! 链路层的推送事件通过 `broadcast` 通道下发，与拉取式查询
//! （`connection_info` 等）并存。角色判定只以 [`ConnectionInfo`] 为准。

use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::{P2pError, Result};

/// 链路层操作失败原因码
///
/// 与底层 P2P 管理器的 ActionListener 原因码一一对应。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReasonCode {
    /// 内部错误
    Error = 0,
    /// 设备不支持 P2P
    P2pUnsupported = 1,
    /// 框架忙，无法处理请求
    Busy = 2,
    /// 未注册任何服务发现请求
    NoServiceRequests = 3,
}

impl ReasonCode {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => ReasonCode::P2pUnsupported,
            2 => ReasonCode::Busy,
            3 => ReasonCode::NoServiceRequests,
            _ => ReasonCode::Error,
        }
    }

    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// 映射到错误分类：不支持 → 链路不可用，忙 → 链路忙，其余透传原因码
    pub fn into_error(self) -> P2pError {
        match self {
            ReasonCode::P2pUnsupported => P2pError::LinkUnavailable,
            ReasonCode::Busy => P2pError::LinkBusy,
            other => P2pError::LinkOperationFailed { code: other.code() },
        }
    }
}

/// 对端设备的链路状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    Connected = 0,
    Invited = 1,
    Failed = 2,
    Available = 3,
    Unavailable = 4,
}

/// 发现回调产出的对端设备快照
///
/// 每次发现事件产生一个不可变快照，跨事件只保证地址相等性。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerDevice {
    pub device_address: String,
    pub device_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_device_type: Option<String>,
    pub is_group_owner: bool,
    pub status: DeviceStatus,
}

impl PeerDevice {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            device_address: address.into(),
            device_name: name.into(),
            primary_device_type: None,
            secondary_device_type: None,
            is_group_owner: false,
            status: DeviceStatus::Available,
        }
    }
}

/// 组成员关系信息 —— 角色判定的唯一权威来源
///
/// `is_host` 和 `host_address` 只有在 `group_formed` 为 true 时才有意义。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub group_formed: bool,
    pub is_host: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_address: Option<IpAddr>,
}

/// 已形成的组的信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub network_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
    pub owner: PeerDevice,
    pub is_host: bool,
    pub clients: Vec<PeerDevice>,
}

/// 服务广播记录
///
/// 实例名 + 服务类型 + 扁平的字符串属性表，仅在广播期间存在。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub instance_name: String,
    pub service_type: String,
    pub attributes: HashMap<String, String>,
}

impl ServiceRecord {
    pub fn new(instance_name: impl Into<String>, service_type: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
            service_type: service_type.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// 组建立请求配置
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// 对端设备地址
    pub device_address: String,
    /// 组主意向 (0-15)，仅为提示；最终角色由链路层决定，
    /// 必须从 ConnectionInfo 读回，不能从该提示推断
    pub group_owner_intent: Option<u8>,
}

impl ConnectConfig {
    pub fn new(device_address: impl Into<String>) -> Self {
        Self {
            device_address: device_address.into(),
            group_owner_intent: None,
        }
    }

    pub fn with_group_owner_intent(mut self, intent: u8) -> Self {
        self.group_owner_intent = Some(intent.min(15));
        self
    }
}

/// 链路层推送事件
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// 可用对端列表变化
    PeersChanged(Vec<PeerDevice>),
    /// 组成员关系变化（按链路层上报顺序投递）
    ConnectionChanged(ConnectionInfo),
    /// 本机设备信息变化
    ThisDeviceChanged(PeerDevice),
    /// 发现到 DNS-SD TXT 记录
    DnsSdTxtRecord {
        full_domain: String,
        attributes: HashMap<String, String>,
        device: PeerDevice,
    },
    /// 发现到 DNS-SD 服务实例
    DnsSdService {
        instance_name: String,
        registration_type: String,
        device: PeerDevice,
    },
}

/// 链路提供者
///
/// 服务请求的注册状态在底层不是幂等的，所以请求的添加/移除
/// 作为独立原语暴露，由 [`crate::directory::ServiceDirectory`] 负责排序。
#[async_trait]
pub trait LinkProvider: Send + Sync {
    /// 开始扫描对端设备
    async fn discover_peers(&self) -> Result<()>;

    /// 停止对端扫描
    async fn stop_peer_discovery(&self) -> Result<()>;

    /// 清除本进程已注册的所有服务广播记录
    async fn clear_advertised_services(&self) -> Result<()>;

    /// 注册一条服务广播记录
    async fn advertise_service(&self, record: ServiceRecord) -> Result<()>;

    /// 注册指定类型的服务发现请求
    async fn add_service_request(&self, service_type: &str) -> Result<()>;

    /// 移除指定类型的服务发现请求
    async fn remove_service_request(&self, service_type: &str) -> Result<()>;

    /// 开始服务发现，结果通过事件通道下发
    async fn discover_services(&self) -> Result<()>;

    /// 请求与指定对端组成 P2P 组
    async fn form_group(&self, config: &ConnectConfig) -> Result<()>;

    /// 主动建组，强制本机成为组主
    async fn create_group(&self) -> Result<()>;

    /// 解散当前组
    async fn remove_group(&self) -> Result<()>;

    /// 取消进行中的组建立请求
    async fn cancel_connect(&self) -> Result<()>;

    /// 拉取当前组成员关系信息
    async fn connection_info(&self) -> Result<ConnectionInfo>;

    /// 拉取当前组信息（未建组时为 None）
    async fn group_info(&self) -> Result<Option<GroupInfo>>;

    /// 拉取当前对端列表
    async fn peer_list(&self) -> Result<Vec<PeerDevice>>;

    /// 订阅链路层推送事件
    fn subscribe(&self) -> broadcast::Receiver<LinkEvent>;
}
