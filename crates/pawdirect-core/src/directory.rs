//! 服务目录
//!
//! 在链路层的服务原语之上提供广播与发现：
//! - 广播本进程的命名服务记录（每进程最多一条，重复广播是替换而非叠加）
//! - 发现同类服务并过滤出本协议的实例
//!
//! # 发现会话
//!
//! 底层的服务请求注册不是幂等的，每次发现会话都要先移除旧请求再重新
//! 注册。会话产出的事件流不可重启，新会话会取代旧会话。

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::Result;
use crate::link::{LinkEvent, LinkProvider, PeerDevice, ServiceRecord};

/// 本协议的固定服务实例名
pub const SERVICE_INSTANCE: &str = "_pawdirect";

/// 本协议的固定 DNS-SD 服务类型
pub const SERVICE_TYPE: &str = "_presence._tcp";

/// 发现事件
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// 收到 TXT 记录（含广播方的属性表）
    TxtRecordFound {
        full_domain: String,
        attributes: std::collections::HashMap<String, String>,
        device: PeerDevice,
    },
    /// 发现服务实例（已按实例名过滤）
    ServiceFound {
        instance_name: String,
        registration_type: String,
        device: PeerDevice,
    },
}

/// 服务目录
pub struct ServiceDirectory {
    link: Arc<dyn LinkProvider>,
    instance_name: String,
    session: Mutex<Option<JoinHandle<()>>>,
}

impl ServiceDirectory {
    pub fn new(link: Arc<dyn LinkProvider>) -> Self {
        Self::with_instance_name(link, SERVICE_INSTANCE)
    }

    pub fn with_instance_name(link: Arc<dyn LinkProvider>, instance_name: &str) -> Self {
        Self {
            link,
            instance_name: instance_name.to_string(),
            session: Mutex::new(None),
        }
    }

    /// 广播一条服务记录
    ///
    /// 先清除本进程之前广播的记录再注册新记录，保证任意时刻最多一条。
    /// 失败原样上报原因码，不重试。
    pub async fn advertise(&self, record: ServiceRecord) -> Result<()> {
        debug!(
            "Registering service record: instance='{}', type='{}'",
            record.instance_name, record.service_type
        );
        self.link.clear_advertised_services().await?;
        self.link.advertise_service(record).await?;
        info!("Service record registered");
        Ok(())
    }

    /// 开始一次服务发现会话
    ///
    /// 返回惰性、无界的事件流。实例名与本进程已知实例名不（忽略大小写）
    /// 匹配的 `ServiceFound` 事件在到达调用方之前被丢弃。
    ///
    /// 新会话取代仍在运行的旧会话。
    pub async fn discover(&self, service_type: &str) -> Result<ReceiverStream<DiscoveryEvent>> {
        let mut session = self.session.lock().await;
        if let Some(previous) = session.take() {
            debug!("Superseding previous discovery session");
            previous.abort();
        }

        // 先订阅再触发发现，避免漏掉紧随其后的事件
        let mut events = self.link.subscribe();

        // 扫描状态跨调用不幂等：移除可能遗留的旧请求后重新注册。
        // 旧请求不存在时的移除失败可以忽略。
        if let Err(e) = self.link.remove_service_request(service_type).await {
            debug!("Removing stale service request failed: {}", e);
        }
        self.link.add_service_request(service_type).await?;
        self.link.discover_services().await?;

        info!("Service discovery started for type '{}'", service_type);

        let (tx, rx) = mpsc::channel(32);
        let instance_name = self.instance_name.clone();

        let handle = tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Discovery subscriber lagged, {} events dropped", n);
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };

                let forwarded = match event {
                    LinkEvent::DnsSdTxtRecord {
                        full_domain,
                        attributes,
                        device,
                    } => DiscoveryEvent::TxtRecordFound {
                        full_domain,
                        attributes,
                        device,
                    },
                    LinkEvent::DnsSdService {
                        instance_name: found,
                        registration_type,
                        device,
                    } => {
                        // 只透传本协议的实例，链路上的无关服务不上交
                        if !found.eq_ignore_ascii_case(&instance_name) {
                            debug!("Suppressing foreign service instance '{}'", found);
                            continue;
                        }
                        DiscoveryEvent::ServiceFound {
                            instance_name: found,
                            registration_type,
                            device,
                        }
                    }
                    _ => continue,
                };

                if tx.send(forwarded).await.is_err() {
                    // 调用方丢弃了事件流
                    break;
                }
            }
        });

        *session = Some(handle);
        Ok(ReceiverStream::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::P2pError;
    use crate::link::ReasonCode;
    use crate::testutil::FakeLink;
    use tokio_stream::StreamExt;

    fn attributes(role: &str) -> std::collections::HashMap<String, String> {
        let mut map = std::collections::HashMap::new();
        map.insert("role".to_string(), role.to_string());
        map
    }

    #[tokio::test]
    async fn test_advertise_twice_leaves_single_record() {
        let link = Arc::new(FakeLink::new());
        let directory = ServiceDirectory::new(link.clone());

        let first = ServiceRecord::new(SERVICE_INSTANCE, SERVICE_TYPE)
            .with_attribute("role", "sender");
        let second = ServiceRecord::new(SERVICE_INSTANCE, SERVICE_TYPE)
            .with_attribute("role", "receiver");

        directory.advertise(first).await.unwrap();
        directory.advertise(second).await.unwrap();

        let records = link.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].attributes.get("role").unwrap(), "receiver");
    }

    #[tokio::test]
    async fn test_advertise_failure_propagates_reason() {
        let link = Arc::new(FakeLink::new());
        *link.fail_with.lock().unwrap() = Some(ReasonCode::Busy);
        let directory = ServiceDirectory::new(link.clone());

        let record = ServiceRecord::new(SERVICE_INSTANCE, SERVICE_TYPE);
        let err = directory.advertise(record).await.unwrap_err();
        assert!(matches!(err, P2pError::LinkBusy));
    }

    #[tokio::test]
    async fn test_discover_filters_foreign_instances() {
        let link = Arc::new(FakeLink::new());
        let directory = ServiceDirectory::new(link.clone());

        let mut stream = directory.discover(SERVICE_TYPE).await.unwrap();

        let device = PeerDevice::new("aa:bb:cc:dd:ee:ff", "peer-a");
        // 无关实例应被丢弃
        link.emit(LinkEvent::DnsSdService {
            instance_name: "_somethingelse".to_string(),
            registration_type: SERVICE_TYPE.to_string(),
            device: device.clone(),
        });
        // 实例名匹配不区分大小写
        link.emit(LinkEvent::DnsSdService {
            instance_name: "_PAWDIRECT".to_string(),
            registration_type: SERVICE_TYPE.to_string(),
            device: device.clone(),
        });

        match stream.next().await.unwrap() {
            DiscoveryEvent::ServiceFound { instance_name, .. } => {
                assert_eq!(instance_name, "_PAWDIRECT");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_discover_forwards_txt_records() {
        let link = Arc::new(FakeLink::new());
        let directory = ServiceDirectory::new(link.clone());

        let mut stream = directory.discover(SERVICE_TYPE).await.unwrap();

        let device = PeerDevice::new("aa:bb:cc:dd:ee:ff", "peer-a");
        link.emit(LinkEvent::DnsSdTxtRecord {
            full_domain: format!("{}.{}.local.", SERVICE_INSTANCE, SERVICE_TYPE),
            attributes: attributes("sender"),
            device,
        });

        match stream.next().await.unwrap() {
            DiscoveryEvent::TxtRecordFound { attributes, .. } => {
                assert_eq!(attributes.get("role").unwrap(), "sender");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_discover_reregisters_request_per_session() {
        let link = Arc::new(FakeLink::new());
        let directory = ServiceDirectory::new(link.clone());

        let _first = directory.discover(SERVICE_TYPE).await.unwrap();
        let _second = directory.discover(SERVICE_TYPE).await.unwrap();

        let calls = link.calls();
        let removes = calls.iter().filter(|c| *c == "remove_service_request").count();
        let adds = calls.iter().filter(|c| *c == "add_service_request").count();
        let discovers = calls.iter().filter(|c| *c == "discover_services").count();
        assert_eq!(removes, 2);
        assert_eq!(adds, 2);
        assert_eq!(discovers, 2);

        // 每次会话里移除先于注册
        let first_remove = calls.iter().position(|c| c == "remove_service_request");
        let first_add = calls.iter().position(|c| c == "add_service_request");
        assert!(first_remove < first_add);
    }

    /// 场景：A 广播 "proto-svc" 带 {role: sender}，B 恰好收到一个匹配事件
    #[tokio::test]
    async fn test_scenario_single_matching_service_found() {
        let link = Arc::new(FakeLink::new());
        let directory = ServiceDirectory::with_instance_name(link.clone(), "proto-svc");

        let mut stream = directory.discover(SERVICE_TYPE).await.unwrap();

        let device = PeerDevice::new("02:00:00:00:00:01", "device-a");
        link.emit(LinkEvent::DnsSdTxtRecord {
            full_domain: format!("proto-svc.{}.local.", SERVICE_TYPE),
            attributes: attributes("sender"),
            device: device.clone(),
        });
        link.emit(LinkEvent::DnsSdService {
            instance_name: "proto-svc".to_string(),
            registration_type: SERVICE_TYPE.to_string(),
            device,
        });

        let txt = stream.next().await.unwrap();
        match txt {
            DiscoveryEvent::TxtRecordFound { attributes, .. } => {
                assert_eq!(attributes.get("role").unwrap(), "sender");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        match stream.next().await.unwrap() {
            DiscoveryEvent::ServiceFound { instance_name, .. } => {
                assert_eq!(instance_name, "proto-svc");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
