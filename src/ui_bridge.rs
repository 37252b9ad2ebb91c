use crate::config::Config;
use crate::protocol::{UiCommand, UiMessage};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

// UI进程和Core进程通过本地UDP通信，端口在配置中指定
pub struct UiBridge {
    socket: Arc<UdpSocket>,
    target_addr: String,
    buffer_size: usize,
    tx: mpsc::Sender<UiCommand>,
}

impl UiBridge {
    pub async fn new(config: &Config, tx: mpsc::Sender<UiCommand>) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(format!("127.0.0.1:{}", config.ui_local_port)).await?;
        let target_addr = format!("127.0.0.1:{}", config.ui_remote_port);

        Ok(Self {
            socket: Arc::new(socket),
            target_addr,
            buffer_size: config.ui_buffer_size,
            tx,
        })
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let mut buf = vec![0u8; self.buffer_size];
        loop {
            let (len, _) = self.socket.recv_from(&mut buf).await?;
            if len == 0 {
                continue;
            }
            let command = match serde_json::from_slice::<UiCommand>(&buf[..len]) {
                Ok(command) => command,
                Err(e) => {
                    log::warn!("Ignoring malformed UI message: {}", e);
                    continue;
                }
            };
            if let Err(e) = self.tx.send(command).await {
                log::error!("Failed to forward UI command: {}", e);
                break;
            }
        }
        Ok(())
    }

    pub async fn send(&self, msg: &UiMessage) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(msg)?;
        self.socket.send_to(&payload, &self.target_addr).await?;
        Ok(())
    }
}
