//! IPC Server - Unix Domain Socket 通信

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use pawdirect_core::{DiscoveryEvent, P2pError, P2pSession, TransferOutcome};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

pub fn socket_path() -> PathBuf {
    std::env::var("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join("pawdirect.sock")
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum IpcRequest {
    #[serde(rename = "status")]
    Status,
    #[serde(rename = "advertise")]
    Advertise {
        #[serde(default)]
        attributes: HashMap<String, String>,
    },
    #[serde(rename = "discover")]
    Discover { timeout_secs: u64 },
    #[serde(rename = "peers")]
    Peers,
    #[serde(rename = "discover_peers")]
    DiscoverPeers,
    #[serde(rename = "stop_peer_discovery")]
    StopPeerDiscovery,
    #[serde(rename = "connect")]
    Connect { device_address: String },
    #[serde(rename = "cancel_connect")]
    CancelConnect,
    #[serde(rename = "create_group")]
    CreateGroup,
    #[serde(rename = "remove_group")]
    RemoveGroup,
    #[serde(rename = "send_file")]
    SendFile {
        file_path: String,
        host_address: Option<IpAddr>,
    },
    #[serde(rename = "receive_file")]
    ReceiveFile { file_name: String },
    #[serde(rename = "send_message")]
    SendMessage {
        text: String,
        host_address: Option<IpAddr>,
    },
    #[serde(rename = "receive_message")]
    ReceiveMessage,
    #[serde(rename = "stop_receiving")]
    StopReceiving,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum IpcResponse {
    #[serde(rename = "ok")]
    Ok { message: String },
    #[serde(rename = "error")]
    Error { code: String, message: String },
    #[serde(rename = "services")]
    Services { services: Vec<ServiceInfo> },
    #[serde(rename = "devices")]
    Devices { devices: Vec<DeviceInfo> },
    #[serde(rename = "message")]
    Message { text: String },
    #[serde(rename = "status")]
    Status {
        state: String,
        role: String,
        group_formed: bool,
        host_address: Option<IpAddr>,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServiceInfo {
    pub instance_name: String,
    pub device_name: String,
    pub device_address: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub address: String,
    pub is_group_owner: bool,
}

pub async fn run_ipc_server(session: Arc<P2pSession>) -> Result<()> {
    let path = socket_path();

    // 删除旧的 socket 文件
    let _ = std::fs::remove_file(&path);

    let listener = UnixListener::bind(&path)?;
    tracing::info!("IPC server listening on {:?}", path);

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                tokio::spawn(handle_client(stream, session.clone()));
            }
            Err(e) => {
                tracing::warn!("Failed to accept IPC connection: {}", e);
            }
        }
    }
}

async fn handle_client(stream: UnixStream, session: Arc<P2pSession>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let request: IpcRequest = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                let resp = IpcResponse::Error {
                    code: "BAD_REQUEST".to_string(),
                    message: format!("Invalid request: {}", e),
                };
                writer
                    .write_all(serde_json::to_string(&resp)?.as_bytes())
                    .await?;
                writer.write_all(b"\n").await?;
                line.clear();
                continue;
            }
        };

        tracing::debug!("IPC request: {:?}", request);
        let response = dispatch(&session, request).await;

        writer
            .write_all(serde_json::to_string(&response)?.as_bytes())
            .await?;
        writer.write_all(b"\n").await?;
        line.clear();
    }

    Ok(())
}

async fn dispatch(session: &P2pSession, request: IpcRequest) -> IpcResponse {
    match request {
        IpcRequest::Status => {
            let info = session.connection_info();
            IpcResponse::Status {
                state: format!("{:?}", session.state()),
                role: format!("{:?}", session.role()),
                group_formed: info.group_formed,
                host_address: info.host_address,
            }
        }
        IpcRequest::Advertise { attributes } => match session.advertise(attributes).await {
            Ok(()) => ok("Advertising service record"),
            Err(e) => error(&e),
        },
        IpcRequest::Discover { timeout_secs } => {
            tracing::info!("Discovering services ({}s)...", timeout_secs);
            match session.discover_services().await {
                Ok(stream) => {
                    let services =
                        collect_services(stream, Duration::from_secs(timeout_secs)).await;
                    IpcResponse::Services { services }
                }
                Err(e) => error(&e),
            }
        }
        IpcRequest::Peers => match session.peer_list().await {
            Ok(peers) => IpcResponse::Devices {
                devices: peers
                    .into_iter()
                    .map(|p| DeviceInfo {
                        name: p.device_name,
                        address: p.device_address,
                        is_group_owner: p.is_group_owner,
                    })
                    .collect(),
            },
            Err(e) => error(&e),
        },
        IpcRequest::DiscoverPeers => match session.discover_peers().await {
            Ok(()) => ok("Peer discovery active"),
            Err(e) => error(&e),
        },
        IpcRequest::StopPeerDiscovery => match session.stop_peer_discovery().await {
            Ok(()) => ok("Peer discovery stopped"),
            Err(e) => error(&e),
        },
        IpcRequest::Connect { device_address } => match session.connect(&device_address).await {
            Ok(()) => ok("Group formation requested"),
            Err(e) => error(&e),
        },
        IpcRequest::CancelConnect => match session.cancel_connect().await {
            Ok(()) => ok("Connect cancelled"),
            Err(e) => error(&e),
        },
        IpcRequest::CreateGroup => match session.create_group().await {
            Ok(()) => ok("Group created, this device is the owner"),
            Err(e) => error(&e),
        },
        IpcRequest::RemoveGroup => match session.remove_group().await {
            Ok(()) => ok("Group removed"),
            Err(e) => error(&e),
        },
        IpcRequest::SendFile {
            file_path,
            host_address,
        } => {
            let path = Path::new(&file_path);
            let result = match host_address {
                Some(address) => session.send_file_to(path, address).await,
                None => session.send_file(path).await,
            };
            outcome_response(result)
        }
        IpcRequest::ReceiveFile { file_name } => {
            outcome_response(session.receive_file(&file_name).await)
        }
        IpcRequest::SendMessage { text, host_address } => {
            let result = match host_address {
                Some(address) => session.send_message_to(&text, address).await,
                None => session.send_message(&text).await,
            };
            outcome_response(result)
        }
        IpcRequest::ReceiveMessage => outcome_response(session.receive_message().await),
        IpcRequest::StopReceiving => {
            session.stop_receiving();
            ok("Receive job cancelled")
        }
    }
}

/// 在给定窗口内收集发现事件，同一设备以最后一次 TXT 记录为准
async fn collect_services(
    stream: tokio_stream::wrappers::ReceiverStream<DiscoveryEvent>,
    window: Duration,
) -> Vec<ServiceInfo> {
    let mut receiver = stream.into_inner();
    let mut by_address: HashMap<String, ServiceInfo> = HashMap::new();
    let deadline = tokio::time::Instant::now() + window;

    loop {
        let event = tokio::select! {
            event = receiver.recv() => event,
            () = tokio::time::sleep_until(deadline) => break,
        };
        let Some(event) = event else { break };

        match event {
            DiscoveryEvent::ServiceFound {
                instance_name,
                device,
                ..
            } => {
                by_address
                    .entry(device.device_address.clone())
                    .or_insert_with(|| ServiceInfo {
                        instance_name: instance_name.clone(),
                        device_name: device.device_name.clone(),
                        device_address: device.device_address.clone(),
                        attributes: HashMap::new(),
                    })
                    .instance_name = instance_name.clone();
            }
            DiscoveryEvent::TxtRecordFound {
                attributes, device, ..
            } => {
                by_address
                    .entry(device.device_address.clone())
                    .or_insert_with(|| ServiceInfo {
                        instance_name: String::new(),
                        device_name: device.device_name.clone(),
                        device_address: device.device_address.clone(),
                        attributes: HashMap::new(),
                    })
                    .attributes = attributes;
            }
        }
    }

    by_address.into_values().collect()
}

fn outcome_response(result: pawdirect_core::Result<TransferOutcome>) -> IpcResponse {
    match result {
        Ok(TransferOutcome::FileSent { bytes, path }) => {
            ok(format!("Sent {} ({} bytes)", path.display(), bytes))
        }
        Ok(TransferOutcome::FileReceived { bytes, path }) => {
            ok(format!("Received {} ({} bytes)", path.display(), bytes))
        }
        Ok(TransferOutcome::MessageSent { bytes }) => ok(format!("Sent message ({} bytes)", bytes)),
        Ok(TransferOutcome::MessageReceived { text }) => IpcResponse::Message { text },
        Err(e) => error(&e),
    }
}

fn ok(message: impl Into<String>) -> IpcResponse {
    IpcResponse::Ok {
        message: message.into(),
    }
}

fn error(e: &P2pError) -> IpcResponse {
    IpcResponse::Error {
        code: e.code().to_string(),
        message: e.to_string(),
    }
}
