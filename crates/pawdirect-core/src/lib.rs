//! Pawdirect Core Library
//!
//! 本地无线点对点（Wi-Fi Direct 风格）的发现 / 角色协商 / 载荷传输协议核心。
//! 两台邻近设备在没有路由器和互联网的情况下互相发现、协商组主角色，
//! 然后通过一条 TCP 字节流交换单个载荷（整个文件或一条短消息）。
//!
//! # 模块
//!
//! - **link**: 链路提供者接口（底层无线栈作为外部依赖注入）
//! - **directory**: 命名服务记录的广播与发现
//! - **orchestrator**: 从"无组"到"已连接且角色确定"的状态机
//! - **transfer**: 固定端口上的文件/消息传输协议
//! - **workflow**: 面向调用方的会话封装
//!
//! # 使用示例
//!
//! ## 发送方
//!
//! ```ignore
//! use pawdirect_core::{P2pSession, SessionOptions};
//!
//! // 1. 发现服务并选择对端
//! let session = P2pSession::new(link, SessionOptions::default());
//! let mut events = session.discover_services().await?;
//! let peer = wait_for_peer(&mut events).await?;
//!
//! // 2. 组成 P2P 组，角色由链路层决定
//! session.connect(&peer.device_address).await?;
//!
//! // 3. 角色确定后发送文件（组主地址来自 ConnectionInfo）
//! let outcome = session.send_file(Path::new("/tmp/photo.jpg")).await?;
//! ```
//!
//! ## 接收方（组主）
//!
//! ```ignore
//! use pawdirect_core::{P2pSession, SessionOptions};
//!
//! // 1. 广播服务记录等待发现
//! session.advertise(attributes).await?;
//!
//! // 2. 强制本机成为组主
//! session.create_group().await?;
//!
//! // 3. 等待组形成后接收（每次调用一个作业）
//! let outcome = session.receive_file("photo.jpg").await?;
//! ```

pub mod config;
pub mod directory;
pub mod error;
pub mod link;
pub mod orchestrator;
pub mod transfer;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testutil;

// Config re-exports
pub use config::AppSettings;

// Error re-exports
pub use error::{P2pError, Result, SocketErrorKind};

// Link re-exports
pub use link::{
    ConnectConfig, ConnectionInfo, DeviceStatus, GroupInfo, LinkEvent, LinkProvider, PeerDevice,
    ReasonCode, ServiceRecord,
};

// Directory re-exports
pub use directory::{DiscoveryEvent, SERVICE_INSTANCE, SERVICE_TYPE, ServiceDirectory};

// Orchestrator re-exports
pub use orchestrator::{ConnectionOrchestrator, P2pState, Role};

// Transfer re-exports
pub use transfer::{
    TRANSFER_PORT, TransferClient, TransferJob, TransferOutcome, TransferPayload, TransferServer,
};

// Workflow re-exports
pub use workflow::{P2pSession, SessionOptions};
