//! 传输服务端（组主角色）
//!
//! 只有 `ConnectionInfo.group_formed && is_host` 成立时才应启动。
//! 绑定固定端口，恰好接受一个连接，把流读到 EOF。一次 `receive_*`
//! 调用对应一个作业，完成（无论成败）后监听套接字随即关闭；
//! 下一个作业需要重新绑定。

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

use crate::error::{P2pError, Result, SocketErrorKind};
use crate::transfer::TransferOutcome;

/// 文件成功落盘后的通知钩子（媒体库重扫等副作用的挂接点）
pub type ReceiveNotify = Arc<dyn Fn(&Path) + Send + Sync>;

/// 传输服务端
pub struct TransferServer {
    listener: TcpListener,
    accept_timeout: Option<Duration>,
    notify: Option<ReceiveNotify>,
}

impl std::fmt::Debug for TransferServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferServer")
            .field("listener", &self.listener)
            .field("accept_timeout", &self.accept_timeout)
            .finish_non_exhaustive()
    }
}

impl TransferServer {
    /// 绑定监听端口
    ///
    /// 端口被占用时以 `SocketError { kind: Bind }` 失败。
    pub async fn bind(port: u16) -> Result<Self> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| P2pError::socket(SocketErrorKind::Bind, e))?;
        debug!("Transfer server bound to {}", addr);
        Ok(Self {
            listener,
            accept_timeout: None,
            notify: None,
        })
    }

    /// 设置接受连接的超时；默认无限期等待
    pub fn with_accept_timeout(mut self, timeout: Duration) -> Self {
        self.accept_timeout = Some(timeout);
        self
    }

    /// 设置文件接收成功后的通知钩子
    ///
    /// 只在文件成功落盘后触发，消息接收和失败的作业都不触发。
    pub fn with_receive_notify(mut self, notify: ReceiveNotify) -> Self {
        self.notify = Some(notify);
        self
    }

    /// 实际绑定到的地址（绑定端口 0 时用于取回分配的端口）
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| P2pError::socket(SocketErrorKind::Io, e))
    }

    /// 接收一个文件并原样写入 `destination`
    ///
    /// 流读到 EOF 即文件结束，返回字节数和落盘路径。
    pub async fn receive_file(self, destination: impl Into<PathBuf>) -> Result<TransferOutcome> {
        let destination = destination.into();
        let (mut stream, peer) = self.accept().await?;
        info!("Receiving file from {} into {:?}", peer, destination);

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| P2pError::socket(SocketErrorKind::Io, e))?;
            }
        }

        let mut file = File::create(&destination)
            .await
            .map_err(|e| P2pError::socket(SocketErrorKind::Io, e))?;
        let bytes = tokio::io::copy(&mut stream, &mut file)
            .await
            .map_err(|e| P2pError::socket(SocketErrorKind::Io, e))?;

        info!("File received: {} bytes into {:?}", bytes, destination);

        if let Some(notify) = &self.notify {
            notify(&destination);
        }

        Ok(TransferOutcome::FileReceived {
            bytes,
            path: destination,
        })
    }

    /// 接收一条文本消息
    ///
    /// 流读到 EOF 即消息结束，按 UTF-8 解码。
    pub async fn receive_message(self) -> Result<TransferOutcome> {
        let (mut stream, peer) = self.accept().await?;
        info!("Receiving message from {}", peer);

        let mut buf = Vec::new();
        stream
            .read_to_end(&mut buf)
            .await
            .map_err(|e| P2pError::socket(SocketErrorKind::Io, e))?;

        let text = String::from_utf8(buf).map_err(|e| P2pError::EncodingError(e.to_string()))?;
        info!("Message received: {} bytes", text.len());

        Ok(TransferOutcome::MessageReceived { text })
    }

    async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let accepted = match self.accept_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.listener.accept())
                .await
                .map_err(|_| {
                    P2pError::socket(
                        SocketErrorKind::Timeout,
                        io::Error::new(io::ErrorKind::TimedOut, "accept timed out"),
                    )
                })?,
            None => self.listener.accept().await,
        };
        accepted.map_err(|e| P2pError::socket(SocketErrorKind::Io, e))
    }
}
