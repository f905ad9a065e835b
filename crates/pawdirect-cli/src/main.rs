//! Pawdirect CLI
//!
//! 命令行客户端，通过 Unix Socket 与守护进程通信

mod client;

use std::collections::HashMap;
use std::net::IpAddr;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pawdirect", version, about = "本地点对点文件/消息互传工具")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 广播本机服务记录
    Advertise {
        /// 附加属性，key=value 形式，可重复
        #[arg(short, long, value_parser = parse_key_value)]
        attribute: Vec<(String, String)>,
    },
    /// 发现附近的服务
    Discover {
        /// 发现窗口 (秒)
        #[arg(short, long, default_value = "10")]
        timeout: u64,
    },
    /// 列出当前对端设备
    Peers,
    /// 开始对端扫描
    DiscoverPeers,
    /// 停止对端扫描
    StopPeerDiscovery,
    /// 与指定对端组成 P2P 组
    Connect {
        /// 对端设备地址
        device: String,
    },
    /// 取消进行中的组建立请求
    CancelConnect,
    /// 主动建组（本机成为组主）
    CreateGroup,
    /// 解散当前组
    RemoveGroup,
    /// 发送文件
    Send {
        /// 要发送的文件路径
        file: String,
        /// 目标地址 (可选，默认发给组主)
        #[arg(short, long)]
        address: Option<IpAddr>,
    },
    /// 接收一个文件
    Receive {
        /// 保存的文件名
        file_name: String,
    },
    /// 发送消息
    SendMsg {
        /// 消息内容
        text: String,
        /// 目标地址 (可选，默认发给组主)
        #[arg(short, long)]
        address: Option<IpAddr>,
    },
    /// 接收一条消息
    ReceiveMsg,
    /// 停止进行中的接收作业
    StopReceiving,
    /// 查看当前状态
    Status,
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("invalid key=value pair: {}", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Advertise { attribute } => {
            let attributes: HashMap<String, String> = attribute.into_iter().collect();
            println!("📡 开始广播服务记录");
            client::send_request(client::IpcRequest::Advertise { attributes }).await?;
        }
        Commands::Discover { timeout } => {
            println!("🔍 发现服务 ({}s)...", timeout);
            let resp = client::send_request(client::IpcRequest::Discover {
                timeout_secs: timeout,
            })
            .await?;
            if let client::IpcResponse::Services { services } = resp {
                if services.is_empty() {
                    println!("   未发现服务");
                } else {
                    for (i, svc) in services.iter().enumerate() {
                        println!(
                            "   [{}] {} ({})",
                            i, svc.device_name, svc.device_address
                        );
                        for (key, value) in &svc.attributes {
                            println!("       {} = {}", key, value);
                        }
                    }
                }
            }
        }
        Commands::Peers => {
            let resp = client::send_request(client::IpcRequest::Peers).await?;
            if let client::IpcResponse::Devices { devices } = resp {
                if devices.is_empty() {
                    println!("   无对端设备");
                } else {
                    for (i, dev) in devices.iter().enumerate() {
                        let owner = if dev.is_group_owner { " [组主]" } else { "" };
                        println!("   [{}] {} ({}){}", i, dev.name, dev.address, owner);
                    }
                }
            }
        }
        Commands::DiscoverPeers => {
            client::send_request(client::IpcRequest::DiscoverPeers).await?;
        }
        Commands::StopPeerDiscovery => {
            client::send_request(client::IpcRequest::StopPeerDiscovery).await?;
        }
        Commands::Connect { device } => {
            println!("🔗 请求组成 P2P 组: {}", device);
            client::send_request(client::IpcRequest::Connect {
                device_address: device,
            })
            .await?;
        }
        Commands::CancelConnect => {
            client::send_request(client::IpcRequest::CancelConnect).await?;
        }
        Commands::CreateGroup => {
            client::send_request(client::IpcRequest::CreateGroup).await?;
        }
        Commands::RemoveGroup => {
            client::send_request(client::IpcRequest::RemoveGroup).await?;
        }
        Commands::Send { file, address } => {
            println!("📤 发送文件: {}", file);
            client::send_request(client::IpcRequest::SendFile {
                file_path: file,
                host_address: address,
            })
            .await?;
        }
        Commands::Receive { file_name } => {
            println!("📥 等待接收文件: {}", file_name);
            client::send_request(client::IpcRequest::ReceiveFile { file_name }).await?;
        }
        Commands::SendMsg { text, address } => {
            println!("📤 发送消息");
            client::send_request(client::IpcRequest::SendMessage {
                text,
                host_address: address,
            })
            .await?;
        }
        Commands::ReceiveMsg => {
            println!("📥 等待接收消息");
            let resp = client::send_request(client::IpcRequest::ReceiveMessage).await?;
            if let client::IpcResponse::Message { text } = resp {
                println!("💬 {}", text);
            }
        }
        Commands::StopReceiving => {
            println!("⏹️  停止接收");
            client::send_request(client::IpcRequest::StopReceiving).await?;
        }
        Commands::Status => {
            let resp = client::send_request(client::IpcRequest::Status).await?;
            if let client::IpcResponse::Status {
                state,
                role,
                group_formed,
                host_address,
            } = resp
            {
                println!("状态: {}", state);
                println!("角色: {}", role);
                println!("组已形成: {}", group_formed);
                if let Some(addr) = host_address {
                    println!("组主地址: {}", addr);
                }
            }
        }
    }

    Ok(())
}
