use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    // 网络配置（静态部分）
    pub ws_url: &'static str,
    pub ws_token: &'static str,

    // 设备标识（动态部分，可在运行时修改）
    pub device_id: String,
    pub client_id: String,

    // 模型配置
    pub model_id: &'static str,
    pub voice_name: &'static str,
    pub system_instruction: &'static str,

    // 音频配置
    pub capture_device: &'static str,
    pub playback_device: &'static str,
    pub capture_sample_rate: u32,
    pub playback_sample_rate: u32,
    pub frame_samples: usize,
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取
    pub fn new() -> Result<Self, &'static str> {
        Ok(Self {
            ws_url: env!("WS_URL"),
            ws_token: env!("WS_TOKEN"),

            device_id: env!("DEVICE_ID").to_string(),
            client_id: env!("CLIENT_ID").to_string(),

            model_id: env!("MODEL_ID"),
            voice_name: env!("VOICE_NAME"),
            system_instruction: env!("SYSTEM_INSTRUCTION"),

            capture_device: env!("CAPTURE_DEVICE"),
            playback_device: env!("PLAYBACK_DEVICE"),
            capture_sample_rate: env!("CAPTURE_SAMPLE_RATE")
                .parse()
                .map_err(|_| "Failed to parse CAPTURE_SAMPLE_RATE")?,
            playback_sample_rate: env!("PLAYBACK_SAMPLE_RATE")
                .parse()
                .map_err(|_| "Failed to parse PLAYBACK_SAMPLE_RATE")?,
            frame_samples: env!("FRAME_SAMPLES")
                .parse()
                .map_err(|_| "Failed to parse FRAME_SAMPLES")?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new().expect("Failed to create default Config from build-time environment variables")
    }
}
