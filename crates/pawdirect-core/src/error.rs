//! 统一错误类型
//!
//! 链路层失败带原始原因码透传，套接字失败按种类区分。
//! 所有组件都不自动重试，重试策略由调用方决定。

use std::fmt;
use std::io;

use thiserror::Error;

/// 套接字错误种类
///
/// 区分绑定、连接、超时和传输中的 I/O 失败，便于调用方分类处理。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketErrorKind {
    /// 监听端口绑定失败（端口被占用等）
    Bind,
    /// 建立连接失败
    Connect,
    /// 对端拒绝连接
    ConnectionRefused,
    /// 连接或接受超时
    Timeout,
    /// 传输过程中的读写错误
    Io,
}

impl fmt::Display for SocketErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SocketErrorKind::Bind => "bind",
            SocketErrorKind::Connect => "connect",
            SocketErrorKind::ConnectionRefused => "connection refused",
            SocketErrorKind::Timeout => "timeout",
            SocketErrorKind::Io => "io",
        };
        write!(f, "{}", name)
    }
}

/// P2P 核心错误
#[derive(Debug, Error)]
pub enum P2pError {
    /// 设备不支持或未启用 P2P 能力
    #[error("P2P link is unavailable on this device")]
    LinkUnavailable,

    /// 链路层忙，无法接受新请求
    #[error("P2P link is busy")]
    LinkBusy,

    /// 链路层操作失败，携带底层原因码
    #[error("link operation failed (reason code {code})")]
    LinkOperationFailed { code: i32 },

    /// 组尚未形成时发起传输
    #[error("no P2P group is formed")]
    ConnectionNotFormed,

    /// 套接字错误
    #[error("socket error ({kind}): {source}")]
    SocketError {
        kind: SocketErrorKind,
        #[source]
        source: io::Error,
    },

    /// 载荷不是合法文本
    #[error("payload encoding error: {0}")]
    EncodingError(String),
}

impl P2pError {
    pub fn socket(kind: SocketErrorKind, source: io::Error) -> Self {
        P2pError::SocketError { kind, source }
    }

    /// 连接阶段的 I/O 错误映射，拒绝连接单独区分
    pub fn from_connect_error(source: io::Error) -> Self {
        let kind = match source.kind() {
            io::ErrorKind::ConnectionRefused => SocketErrorKind::ConnectionRefused,
            io::ErrorKind::TimedOut => SocketErrorKind::Timeout,
            _ => SocketErrorKind::Connect,
        };
        P2pError::SocketError { kind, source }
    }

    /// IPC 层使用的稳定错误码
    pub fn code(&self) -> &'static str {
        match self {
            P2pError::LinkUnavailable => "LINK_UNAVAILABLE",
            P2pError::LinkBusy => "LINK_BUSY",
            P2pError::LinkOperationFailed { .. } => "LINK_OPERATION_FAILED",
            P2pError::ConnectionNotFormed => "CONNECTION_NOT_FORMED",
            P2pError::SocketError { .. } => "SOCKET_ERROR",
            P2pError::EncodingError(_) => "ENCODING_ERROR",
        }
    }

    /// 传输作业里的套接字错误种类（如果是套接字错误）
    pub fn socket_kind(&self) -> Option<SocketErrorKind> {
        match self {
            P2pError::SocketError { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, P2pError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_mapping() {
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let err = P2pError::from_connect_error(refused);
        assert_eq!(err.socket_kind(), Some(SocketErrorKind::ConnectionRefused));

        let timeout = io::Error::new(io::ErrorKind::TimedOut, "timed out");
        let err = P2pError::from_connect_error(timeout);
        assert_eq!(err.socket_kind(), Some(SocketErrorKind::Timeout));
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(P2pError::LinkUnavailable.code(), "LINK_UNAVAILABLE");
        assert_eq!(P2pError::ConnectionNotFormed.code(), "CONNECTION_NOT_FORMED");
        assert_eq!(
            P2pError::LinkOperationFailed { code: 2 }.code(),
            "LINK_OPERATION_FAILED"
        );
    }
}
