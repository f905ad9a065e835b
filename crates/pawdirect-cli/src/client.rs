//! IPC Client - 与守护进程通信

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

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

pub async fn send_request(request: IpcRequest) -> Result<IpcResponse> {
    let path = socket_path();

    let stream = match UnixStream::connect(&path).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("❌ 无法连接到守护进程: {}", e);
            eprintln!("   请确保 pawdirect-daemon 正在运行");
            eprintln!("   运行: systemctl start pawdirect");
            return Err(e.into());
        }
    };

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    // 发送请求
    let json = serde_json::to_string(&request)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;

    // 读取响应
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let response: IpcResponse = serde_json::from_str(&line)?;

    match &response {
        IpcResponse::Ok { message } => println!("✅ {}", message),
        IpcResponse::Error { code, message } => eprintln!("❌ [{}] {}", code, message),
        _ => {}
    }

    Ok(response)
}
