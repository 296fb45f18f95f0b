mod audio;
mod config;
mod error;
mod protocol;
mod session;
mod transcript;
mod transport;

use audio::{AlsaCapture, AlsaSink, MonotonicClock, PlaybackScheduler};
use config::Config;
use session::{Session, SessionStatus};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use transport::{LinkCommand, LinkEvent, LiveLink};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();

    // 加载配置
    let mut config = Config::new().unwrap_or_default();

    // 设备端UUID，先从本地文件读取以保持重启间身份一致，如果不存在则生成新的并保存
    let uuid_file_path = "airlive_uuid.txt";
    if config.client_id == "unknown-client" {
        if let Ok(content) = std::fs::read_to_string(uuid_file_path) {
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                config.client_id = trimmed.to_string();
                log::info!("Loaded Client ID from file: {}", config.client_id);
            }
        }
    }

    // 生成新的UUID并保存
    if config.client_id == "unknown-client" {
        config.client_id = Uuid::new_v4().to_string();
        log::info!("Generated new Client ID: {}", config.client_id);
        if let Err(e) = std::fs::write(uuid_file_path, &config.client_id) {
            log::warn!("Failed to save Client ID to file: {}", e);
        }
    }
    if config.device_id == "unknown-device" {
        config.device_id = Uuid::new_v4().to_string();
    }

    // 创建通道，用于组件间通信
    let (tx_link_event, mut rx_link_event) = mpsc::channel::<LinkEvent>(100);
    let (tx_link_cmd, rx_link_cmd) = mpsc::channel::<LinkCommand>(100);
    let (tx_frame, mut rx_frame) = mpsc::channel::<Vec<f32>>(100);

    // 会话拥有麦克风与播放资源，播放端通过工厂按会话创建
    let capture = Box::new(AlsaCapture::new(
        config.capture_device,
        config.capture_sample_rate,
        config.frame_samples,
    ));
    let playback_device = config.playback_device;
    let playback_rate = config.playback_sample_rate;
    let make_scheduler: session::SchedulerFactory = Box::new(move || {
        let sink = AlsaSink::open(playback_device, playback_rate)?;
        PlaybackScheduler::new(
            Box::new(sink),
            Arc::new(MonotonicClock::new()),
            playback_rate,
        )
    });

    let mut session = Session::new(capture, make_scheduler, tx_link_cmd, tx_frame);

    // 获取麦克风和播放设备，失败则直接退出
    if let Err(e) = session.start().await {
        anyhow::bail!("Failed to start live session: {}", e);
    }

    // 启动网络链接，与实时语音服务通信
    let link = LiveLink::new(config.clone(), tx_link_event, rx_link_cmd);
    tokio::spawn(async move {
        link.run().await;
    });

    println!("airlive started. Speak after the connection opens; Ctrl+C to stop.");

    // 主事件循环，处理链接事件和麦克风帧
    loop {
        tokio::select! {
            // 监听 Ctrl+C 信号
            _ = signal::ctrl_c() => {
                println!("Received Ctrl+C, shutting down...");
                session.stop().await;
                break;
            }

            Some(event) = rx_link_event.recv() => {
                if let Some(turn) = session.handle_link_event(event).await {
                    if !turn.input.is_empty() {
                        println!("You:    {}", turn.input);
                    }
                    if !turn.output.is_empty() {
                        println!("AIRORA: {}", turn.output);
                    }
                }
                match session.status() {
                    SessionStatus::Error => {
                        eprintln!("Session ended with an error. Restart to retry.");
                        break;
                    }
                    SessionStatus::Idle => {
                        println!("Session closed.");
                        break;
                    }
                    _ => {}
                }
            }

            Some(frame) = rx_frame.recv() => {
                session.handle_frame(frame).await;
            }
        }
    }

    if !session.turns().is_empty() {
        println!("{} turn(s) this session.", session.turns().len());
    }

    Ok(())
}
