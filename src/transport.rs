use crate::config::Config;
use crate::protocol::{
    Content, GenerationConfig, MediaChunk, MediaMessage, PrebuiltVoiceConfig, ServerMessage, Setup,
    SetupMessage, SpeechConfig, TextPart, TranscriptionConfig, VoiceConfig,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

#[derive(Debug)]
pub enum LinkEvent {
    Opened,
    Message(ServerMessage),
    Closed,
    Faulted(String),
}

#[derive(Debug)]
pub enum LinkCommand {
    SendMedia(MediaChunk),
    Close,
}

pub struct LiveLink {
    config: Config,
    tx: mpsc::Sender<LinkEvent>,
    rx_cmd: mpsc::Receiver<LinkCommand>,
}

impl LiveLink {
    pub fn new(
        config: Config,
        tx: mpsc::Sender<LinkEvent>,
        rx_cmd: mpsc::Receiver<LinkCommand>,
    ) -> Self {
        Self { config, tx, rx_cmd }
    }

    /// Drive one connection to completion. No automatic reconnect: a dead
    /// link surfaces as an error state and the user retries explicitly.
    pub async fn run(mut self) {
        match self.connect_and_loop().await {
            Ok(()) => {
                let _ = self.tx.send(LinkEvent::Closed).await;
            }
            Err(e) => {
                log::error!("Connection error: {:#}", e);
                let _ = self.tx.send(LinkEvent::Faulted(format!("{:#}", e))).await;
            }
        }
    }

    // 进入连接和主循环，处理WebSocket消息和发送命令
    async fn connect_and_loop(&mut self) -> anyhow::Result<()> {
        // 根据配置构建WebSocket请求
        let url = Url::parse(self.config.ws_url)?;
        let host = url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("ws_url has no host"))?
            .to_string();

        let request = tokio_tungstenite::tungstenite::http::Request::builder()
            .method("GET")
            .uri(self.config.ws_url)
            .header("Host", host)
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header(
                "Sec-WebSocket-Key",
                tokio_tungstenite::tungstenite::handshake::client::generate_key(),
            )
            .header("Authorization", format!("Bearer {}", self.config.ws_token))
            .header("Device-Id", &self.config.device_id)
            .header("Client-Id", &self.config.client_id)
            .body(())?;

        log::info!("Connecting to {}...", self.config.ws_url);
        let (ws_stream, _) = connect_async(request).await?;
        log::info!("Connected!");

        let (mut write, mut read) = ws_stream.split();

        // 发送Setup消息进行初始化：模型、语音、双向转写
        let setup = SetupMessage {
            setup: Setup {
                model: self.config.model_id.to_string(),
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: self.config.voice_name.to_string(),
                            },
                        },
                    },
                },
                system_instruction: if self.config.system_instruction.is_empty() {
                    None
                } else {
                    Some(Content {
                        parts: vec![TextPart {
                            text: self.config.system_instruction.to_string(),
                        }],
                    })
                },
                input_audio_transcription: TranscriptionConfig {},
                output_audio_transcription: TranscriptionConfig {},
            },
        };
        let setup_json = serde_json::to_string(&setup)?;
        log::debug!("Sending Setup: {}", setup_json);
        write.send(Message::Text(setup_json.into())).await?;

        self.tx.send(LinkEvent::Opened).await?;

        // 主循环，处理读取和写入
        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(msg)) => {
                            match msg {
                                Message::Text(text) => {
                                    self.dispatch_payload(text.as_bytes()).await?;
                                }
                                // 服务端也可能用二进制帧承载JSON消息
                                Message::Binary(data) => {
                                    self.dispatch_payload(&data).await?;
                                }
                                Message::Close(frame) => {
                                    log::info!("Server closed connection: {:?}", frame);
                                    return Ok(());
                                }
                                _ => {}
                            }
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(()),
                    }
                }
                cmd = self.rx_cmd.recv() => {
                    match cmd {
                        Some(LinkCommand::SendMedia(chunk)) => {
                            let msg = MediaMessage { media: chunk };
                            let json = serde_json::to_string(&msg)?;
                            write.send(Message::Text(json.into())).await?;
                        }
                        Some(LinkCommand::Close) | None => {
                            log::info!("Closing connection");
                            let _ = write.send(Message::Close(None)).await;
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    async fn dispatch_payload(&self, payload: &[u8]) -> anyhow::Result<()> {
        match serde_json::from_slice::<ServerMessage>(payload) {
            Ok(msg) => {
                self.tx.send(LinkEvent::Message(msg)).await?;
            }
            Err(e) => {
                // 无法解析的消息记录后跳过，不中断会话
                log::warn!("Unparseable server message ({} bytes): {}", payload.len(), e);
            }
        }
        Ok(())
    }
}
