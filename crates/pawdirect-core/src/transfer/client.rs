//! 传输客户端（发起方角色）
//!
//! 向组主地址打开套接字，完整写出载荷，然后关闭写端以发出 EOF。
//! 成功的含义是"所有字节无错误地写入套接字"——不等待对端回执。
//! 连接拒绝、超时和部分写入都作为失败上报，客户端不做任何自动重试。

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::error::{P2pError, Result, SocketErrorKind};
use crate::transfer::TransferOutcome;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// 传输客户端
pub struct TransferClient {
    host: IpAddr,
    port: u16,
    connect_timeout: Duration,
}

impl TransferClient {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            host,
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// 设置连接超时，保证"无监听者"在有界时间内失败而不是悬挂
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// 发送整个文件
    pub async fn send_file(&self, path: &Path) -> Result<TransferOutcome> {
        let mut stream = self.connect().await?;

        let mut file = File::open(path)
            .await
            .map_err(|e| P2pError::socket(SocketErrorKind::Io, e))?;
        let bytes = tokio::io::copy(&mut file, &mut stream)
            .await
            .map_err(|e| P2pError::socket(SocketErrorKind::Io, e))?;

        // 关闭写端，对端以 EOF 作为文件结束信号
        stream
            .shutdown()
            .await
            .map_err(|e| P2pError::socket(SocketErrorKind::Io, e))?;

        info!("File sent: {} bytes from {:?}", bytes, path);
        Ok(TransferOutcome::FileSent {
            bytes,
            path: path.to_path_buf(),
        })
    }

    /// 发送一条文本消息
    pub async fn send_message(&self, text: &str) -> Result<TransferOutcome> {
        let mut stream = self.connect().await?;

        stream
            .write_all(text.as_bytes())
            .await
            .map_err(|e| P2pError::socket(SocketErrorKind::Io, e))?;
        stream
            .shutdown()
            .await
            .map_err(|e| P2pError::socket(SocketErrorKind::Io, e))?;

        let bytes = text.len() as u64;
        info!("Message sent: {} bytes", bytes);
        Ok(TransferOutcome::MessageSent { bytes })
    }

    async fn connect(&self) -> Result<TcpStream> {
        let addr = SocketAddr::new(self.host, self.port);
        debug!("Connecting to transfer server at {}", addr);

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                P2pError::socket(
                    SocketErrorKind::Timeout,
                    std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
                )
            })?
            .map_err(P2pError::from_connect_error)?;

        Ok(stream)
    }
}
