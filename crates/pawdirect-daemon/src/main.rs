//! Pawdirect Daemon
//!
//! 后台守护进程，负责：
//! - 服务记录的广播与发现
//! - P2P 组的形成与拆除
//! - 固定端口上的文件/消息传输
//! - 通过 Unix Socket 与 CLI 通信

mod ipc;
mod service;

use std::sync::Arc;

use anyhow::Result;
use pawdirect_core::{AppSettings, P2pSession, SessionOptions};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 桥接 log crate（pawdirect-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    // 初始化日志
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pawdirect_core=debug")),
        )
        .try_init();

    tracing::info!("Pawdirect Daemon starting...");

    let settings = AppSettings::load_or_init();
    tracing::info!("Device name: {}", settings.device_name);

    let link = Arc::new(service::DaemonLink::new());
    let mut session = P2pSession::new(link.clone(), SessionOptions::from(&settings));
    if settings.notify_on_receive {
        session = session.with_receive_notify(Arc::new(|path: &std::path::Path| {
            tracing::info!("File received: {}", path.display());
        }));
    }
    let session = Arc::new(session);

    // 启动 IPC 服务器
    let ipc_handle = tokio::spawn(ipc::run_ipc_server(session.clone()));

    // 启动核心服务
    let service_handle = tokio::spawn(service::run_service(link));

    // 等待任一任务完成
    tokio::select! {
        res = ipc_handle => {
            tracing::error!("IPC server exited: {:?}", res);
        }
        res = service_handle => {
            tracing::error!("Core service exited: {:?}", res);
        }
    }

    Ok(())
}
