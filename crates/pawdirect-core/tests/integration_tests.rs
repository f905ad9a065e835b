//! 集成测试 - 传输协议
//!
//! 在 127.0.0.1 的真实 TCP 套接字上验证文件/消息传输的端到端性质：
//! 字节级保真、EOF 终止语义、失败在有界时间内终结。

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use pawdirect_core::{P2pError, SocketErrorKind, TransferClient, TransferOutcome, TransferServer};
use tokio::io::AsyncWriteExt;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("pawdirect-test-{}-{}", std::process::id(), name))
}

/// 大小为 N 的文件经传输后逐字节一致，上报的大小等于 N
#[tokio::test]
async fn test_file_transfer_is_byte_identical() {
    let source = temp_path("roundtrip-source.bin");
    let dest = temp_path("roundtrip-dest.bin");
    // 覆盖全部字节值的非平凡载荷
    let payload: Vec<u8> = (0..65536u32).map(|i| (i % 251) as u8).collect();
    tokio::fs::write(&source, &payload).await.unwrap();

    let server = TransferServer::bind(0).await.unwrap();
    let port = server.local_addr().unwrap().port();
    let dest_for_server = dest.clone();
    let server_task = tokio::spawn(async move { server.receive_file(dest_for_server).await });

    let client = TransferClient::new(LOCALHOST, port);
    let sent = client.send_file(&source).await.unwrap();
    match sent {
        TransferOutcome::FileSent { bytes, .. } => assert_eq!(bytes, payload.len() as u64),
        other => panic!("unexpected outcome: {:?}", other),
    }

    let received = server_task.await.unwrap().unwrap();
    match received {
        TransferOutcome::FileReceived { bytes, path } => {
            assert_eq!(bytes, payload.len() as u64);
            assert_eq!(path, dest);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let round = tokio::fs::read(&dest).await.unwrap();
    assert_eq!(round, payload);

    let _ = tokio::fs::remove_file(&source).await;
    let _ = tokio::fs::remove_file(&dest).await;
}

/// 空文件：EOF 是唯一的结束信号，零字节也是合法作业
#[tokio::test]
async fn test_empty_file_transfer() {
    let source = temp_path("empty-source.bin");
    let dest = temp_path("empty-dest.bin");
    tokio::fs::write(&source, b"").await.unwrap();

    let server = TransferServer::bind(0).await.unwrap();
    let port = server.local_addr().unwrap().port();
    let dest_for_server = dest.clone();
    let server_task = tokio::spawn(async move { server.receive_file(dest_for_server).await });

    let client = TransferClient::new(LOCALHOST, port);
    client.send_file(&source).await.unwrap();

    match server_task.await.unwrap().unwrap() {
        TransferOutcome::FileReceived { bytes, .. } => assert_eq!(bytes, 0),
        other => panic!("unexpected outcome: {:?}", other),
    }

    let _ = tokio::fs::remove_file(&source).await;
    let _ = tokio::fs::remove_file(&dest).await;
}

/// 非 ASCII 消息不截断、不损坏
#[tokio::test]
async fn test_message_preserves_non_ascii_content() {
    let message = "héllo, 世界! 🐾";

    let server = TransferServer::bind(0).await.unwrap();
    let port = server.local_addr().unwrap().port();
    let server_task = tokio::spawn(async move { server.receive_message().await });

    let client = TransferClient::new(LOCALHOST, port);
    client.send_message(message).await.unwrap();

    match server_task.await.unwrap().unwrap() {
        TransferOutcome::MessageReceived { text } => assert_eq!(text, message),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

/// 场景：组主监听，客户端发送 5 字节消息 "hello"
#[tokio::test]
async fn test_hello_message_scenario() {
    let server = TransferServer::bind(0).await.unwrap();
    let port = server.local_addr().unwrap().port();
    let server_task = tokio::spawn(async move { server.receive_message().await });

    let client = TransferClient::new(LOCALHOST, port);
    match client.send_message("hello").await.unwrap() {
        TransferOutcome::MessageSent { bytes } => assert_eq!(bytes, 5),
        other => panic!("unexpected outcome: {:?}", other),
    }

    match server_task.await.unwrap().unwrap() {
        TransferOutcome::MessageReceived { text } => assert_eq!(text, "hello"),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

/// 畸形 UTF-8 的消息载荷以编码错误终结，没有部分成功
#[tokio::test]
async fn test_malformed_utf8_message_is_encoding_error() {
    let server = TransferServer::bind(0).await.unwrap();
    let port = server.local_addr().unwrap().port();
    let server_task = tokio::spawn(async move { server.receive_message().await });

    let mut stream = tokio::net::TcpStream::connect((LOCALHOST, port))
        .await
        .unwrap();
    stream.write_all(&[0xff, 0xfe, 0xfd]).await.unwrap();
    stream.shutdown().await.unwrap();

    let err = server_task.await.unwrap().unwrap_err();
    assert!(matches!(err, P2pError::EncodingError(_)));
}

/// 端口已被占用时绑定以 Bind 种类失败
#[tokio::test]
async fn test_bind_to_occupied_port_fails() {
    let first = TransferServer::bind(0).await.unwrap();
    let port = first.local_addr().unwrap().port();

    let err = TransferServer::bind(port).await.unwrap_err();
    assert_eq!(err.socket_kind(), Some(SocketErrorKind::Bind));
}

/// 场景：无监听者时客户端在有界时间内以连接拒绝失败，绝不悬挂
#[tokio::test]
async fn test_connection_refused_is_bounded() {
    // 绑定后立即释放以拿到一个当前无监听者的端口
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let client = TransferClient::new(LOCALHOST, port).with_connect_timeout(Duration::from_secs(2));
    let result = tokio::time::timeout(Duration::from_secs(5), client.send_message("hi"))
        .await
        .expect("client must fail within bounded time");

    let err = result.unwrap_err();
    assert_eq!(err.socket_kind(), Some(SocketErrorKind::ConnectionRefused));
}

/// 配置了接受超时的服务端在无人连接时以超时失败
#[tokio::test]
async fn test_accept_timeout() {
    let server = TransferServer::bind(0)
        .await
        .unwrap()
        .with_accept_timeout(Duration::from_millis(200));

    let result = tokio::time::timeout(Duration::from_secs(2), server.receive_message())
        .await
        .expect("accept must time out within bounded time");

    let err = result.unwrap_err();
    assert_eq!(err.socket_kind(), Some(SocketErrorKind::Timeout));
}

/// 接收后通知只在文件成功落盘后触发
#[tokio::test]
async fn test_receive_notify_fires_only_after_file_receive() {
    let notified = Arc::new(AtomicBool::new(false));

    // 文件接收成功 → 触发
    let source = temp_path("notify-source.bin");
    let dest = temp_path("notify-dest.bin");
    tokio::fs::write(&source, b"payload").await.unwrap();

    let flag = notified.clone();
    let server = TransferServer::bind(0)
        .await
        .unwrap()
        .with_receive_notify(Arc::new(move |_path: &std::path::Path| {
            flag.store(true, Ordering::SeqCst);
        }));
    let port = server.local_addr().unwrap().port();
    let dest_for_server = dest.clone();
    let server_task = tokio::spawn(async move { server.receive_file(dest_for_server).await });

    let client = TransferClient::new(LOCALHOST, port);
    client.send_file(&source).await.unwrap();
    server_task.await.unwrap().unwrap();
    assert!(notified.load(Ordering::SeqCst));

    // 消息接收 → 不触发
    let notified = Arc::new(AtomicBool::new(false));
    let flag = notified.clone();
    let server = TransferServer::bind(0)
        .await
        .unwrap()
        .with_receive_notify(Arc::new(move |_path: &std::path::Path| {
            flag.store(true, Ordering::SeqCst);
        }));
    let port = server.local_addr().unwrap().port();
    let server_task = tokio::spawn(async move { server.receive_message().await });

    let client = TransferClient::new(LOCALHOST, port);
    client.send_message("no side effects").await.unwrap();
    server_task.await.unwrap().unwrap();
    assert!(!notified.load(Ordering::SeqCst));

    let _ = tokio::fs::remove_file(&source).await;
    let _ = tokio::fs::remove_file(&dest).await;
}
