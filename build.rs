use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Deserialize)]
struct Config {
    network: Network,
    model: Model,
    audio: Audio,
}

#[derive(Deserialize)]
struct Network {
    ws_url: String,
    ws_token: String,
    device_id: String,
    client_id: String,
}

#[derive(Deserialize)]
struct Model {
    model_id: String,
    voice_name: String,
    system_instruction: String,
}

#[derive(Deserialize)]
struct Audio {
    capture_device: String,
    playback_device: String,
    capture_sample_rate: u32,
    playback_sample_rate: u32,
    frame_samples: usize,
}

// Read config.toml at build time and bake it in as environment variables.
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    println!("cargo:rustc-env=WS_URL={}", config.network.ws_url);
    println!("cargo:rustc-env=WS_TOKEN={}", config.network.ws_token);
    println!("cargo:rustc-env=DEVICE_ID={}", config.network.device_id);
    println!("cargo:rustc-env=CLIENT_ID={}", config.network.client_id);

    println!("cargo:rustc-env=MODEL_ID={}", config.model.model_id);
    println!("cargo:rustc-env=VOICE_NAME={}", config.model.voice_name);
    println!(
        "cargo:rustc-env=SYSTEM_INSTRUCTION={}",
        config.model.system_instruction
    );

    println!(
        "cargo:rustc-env=CAPTURE_DEVICE={}",
        config.audio.capture_device
    );
    println!(
        "cargo:rustc-env=PLAYBACK_DEVICE={}",
        config.audio.playback_device
    );
    println!(
        "cargo:rustc-env=CAPTURE_SAMPLE_RATE={}",
        config.audio.capture_sample_rate
    );
    println!(
        "cargo:rustc-env=PLAYBACK_SAMPLE_RATE={}",
        config.audio.playback_sample_rate
    );
    println!("cargo:rustc-env=FRAME_SAMPLES={}", config.audio.frame_samples);
}
