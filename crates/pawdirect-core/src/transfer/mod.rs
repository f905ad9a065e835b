//! 传输协议
//!
//! 每个作业一条 TCP 字节流：文件变体是原始文件字节，消息变体是原始
//! 文本字节，两者都以流结束（EOF）作为唯一的完成信号。没有长度前缀、
//! 校验和、握手或应用层确认。
//!
//! 固定服务端口 8988，文件和消息协议共用，但任意时刻只允许一个监听者。
//!
//! 单个作业的状态机（服务端与客户端相同）：
//!
//! ```text
//! Idle → Connecting/Listening → Transferring → {Succeeded | Failed}
//! ```
//!
//! 终态不可逆，观察到 `Failed` 的调用方必须从 `Idle` 开始新作业重试。

pub mod client;
pub mod server;

use std::net::IpAddr;
use std::path::PathBuf;

use uuid::Uuid;

pub use client::TransferClient;
pub use server::TransferServer;

/// 固定传输端口
pub const TRANSFER_PORT: u16 = 8988;

/// 作业载荷
#[derive(Debug, Clone)]
pub enum TransferPayload {
    /// 整个文件
    File(PathBuf),
    /// 一条短文本消息
    Message(String),
}

/// 一次发送或接收作业
///
/// 每次调用创建一个，终态之后即丢弃，不持久化。
#[derive(Debug, Clone)]
pub struct TransferJob {
    pub id: Uuid,
    pub payload: TransferPayload,
    pub target: IpAddr,
    pub port: u16,
}

impl TransferJob {
    pub fn new(payload: TransferPayload, target: IpAddr, port: u16) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            target,
            port,
        }
    }
}

/// 作业的成功终态
///
/// 失败终态是 [`crate::error::P2pError`]，二者必居其一，没有部分完成。
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    /// 文件已全部写入套接字（本地完成，不等待对端回执）
    FileSent { bytes: u64, path: PathBuf },
    /// 文件已接收并落盘
    FileReceived { bytes: u64, path: PathBuf },
    /// 消息已全部写入套接字
    MessageSent { bytes: u64 },
    /// 消息已接收并解码
    MessageReceived { text: String },
}
