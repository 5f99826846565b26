use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, RwLock};
use zeromq::{PubSocket, Socket, SocketSend, ZmqMessage};

use super::{address_mismatch, ChannelSender};
use crate::db::models::{Address, Notification};
use crate::error::{AppError, AppResult};

/// Subscribers connecting right after bind miss early messages otherwise.
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Publishes `[topic, content]` frames on PUB sockets bound per port.
pub struct ZeroMqSender {
    settle_delay: Duration,
    sockets: RwLock<HashMap<u16, Arc<Mutex<PubSocket>>>>,
}

impl Default for ZeroMqSender {
    fn default() -> Self {
        Self::new()
    }
}

impl ZeroMqSender {
    pub fn new() -> Self {
        Self::with_settle_delay(DEFAULT_SETTLE_DELAY)
    }

    pub fn with_settle_delay(settle_delay: Duration) -> Self {
        Self {
            settle_delay,
            sockets: RwLock::new(HashMap::new()),
        }
    }

    pub async fn cached_sockets(&self) -> usize {
        self.sockets.read().await.len()
    }

    async fn socket_for(&self, port: u16) -> AppResult<Arc<Mutex<PubSocket>>> {
        if let Some(socket) = self.sockets.read().await.get(&port) {
            return Ok(socket.clone());
        }

        let mut sockets = self.sockets.write().await;
        if let Some(socket) = sockets.get(&port) {
            return Ok(socket.clone());
        }

        let endpoint = format!("tcp://0.0.0.0:{}", port);
        let mut socket = PubSocket::new();
        socket.bind(&endpoint).await.map_err(|e| {
            AppError::ServerError(format!("failed to bind ZeroMQ socket {}: {}", endpoint, e))
        })?;
        tracing::info!("Bound ZeroMQ publisher on {}", endpoint);

        tokio::time::sleep(self.settle_delay).await;

        let socket = Arc::new(Mutex::new(socket));
        sockets.insert(port, socket.clone());
        Ok(socket)
    }

    pub async fn remove_socket(&self, port: u16) {
        let removed = self.sockets.write().await.remove(&port);
        if let Some(socket) = removed {
            close_socket(port, socket).await;
        }
    }

    pub async fn close_all(&self) {
        let drained: Vec<_> = self.sockets.write().await.drain().collect();
        for (port, socket) in drained {
            close_socket(port, socket).await;
        }
    }
}

async fn close_socket(port: u16, socket: Arc<Mutex<PubSocket>>) {
    let errors = socket.lock().await.unbind_all().await;
    for e in errors {
        tracing::debug!("ZeroMQ unbind on port {} failed: {}", port, e);
    }
    tracing::info!("Closed ZeroMQ publisher on port {}", port);
}

#[async_trait]
impl ChannelSender for ZeroMqSender {
    async fn send(&self, notification: &Notification, address: &Address) -> AppResult<String> {
        let Address::ZeroMq(zmq) = address else {
            return Err(address_mismatch("ZeroMQ", address));
        };
        if zmq.port == 0 {
            return Err(AppError::ContractInvalid("ZeroMQ port is required".to_string()));
        }

        let socket = self.socket_for(zmq.port).await?;

        let mut message = ZmqMessage::from(zmq.topic.clone());
        message.push_back(Bytes::from(notification.content.clone()));

        socket.lock().await.send(message).await.map_err(|e| {
            AppError::ServerError(format!(
                "failed to publish on ZeroMQ port {}: {}",
                zmq.port, e
            ))
        })?;

        tracing::debug!(
            "Published notification {} on ZeroMQ port {}",
            notification.id,
            zmq.port
        );
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ZeroMqAddress;

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn notification() -> Notification {
        Notification {
            content: "pressure drop".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn port_is_required() {
        let sender = ZeroMqSender::with_settle_delay(Duration::ZERO);
        let err = sender
            .send(&notification(), &Address::ZeroMq(ZeroMqAddress::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ContractInvalid(_)));
    }

    #[tokio::test]
    async fn socket_is_bound_once_per_port() {
        let sender = ZeroMqSender::with_settle_delay(Duration::ZERO);
        let address = Address::ZeroMq(ZeroMqAddress {
            host: "localhost".into(),
            port: free_port(),
            topic: "alerts".into(),
        });

        sender.send(&notification(), &address).await.unwrap();
        sender.send(&notification(), &address).await.unwrap();
        assert_eq!(sender.cached_sockets().await, 1);

        sender.remove_socket(address.port()).await;
        assert_eq!(sender.cached_sockets().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sends_share_one_socket() {
        let sender = Arc::new(ZeroMqSender::with_settle_delay(Duration::from_millis(50)));
        let address = Address::ZeroMq(ZeroMqAddress {
            host: "localhost".into(),
            port: free_port(),
            topic: "alerts".into(),
        });

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sender = sender.clone();
                let address = address.clone();
                tokio::spawn(async move { sender.send(&notification(), &address).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(sender.cached_sockets().await, 1);
        sender.close_all().await;
        assert_eq!(sender.cached_sockets().await, 0);
    }
}
