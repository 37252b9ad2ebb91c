use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    application: Application,
    monitor: Monitor,
    audio: Audio,
    ui: Ui,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Monitor {
    threshold_percent: u8,
    cooldown_seconds: u32,
    base_volume: f32,
    frame_rate_hz: u32,
    autostart: bool,
}

#[derive(Deserialize)]
struct Audio {
    capture_device: String,
    playback_device: String,
    sample_rate: u32,
    playback_sample_rate: u32,
    fft_size: usize,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
}

#[derive(Deserialize)]
struct Ui {
    local_port: u16,
    remote_port: u16,
    buffer_size: usize,
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // 监控参数
    println!("cargo:rustc-env=MONITOR_THRESHOLD_PERCENT={}", config.monitor.threshold_percent);
    println!("cargo:rustc-env=MONITOR_COOLDOWN_SECONDS={}", config.monitor.cooldown_seconds);
    println!("cargo:rustc-env=MONITOR_BASE_VOLUME={}", config.monitor.base_volume);
    println!("cargo:rustc-env=MONITOR_FRAME_RATE_HZ={}", config.monitor.frame_rate_hz);
    println!("cargo:rustc-env=MONITOR_AUTOSTART={}", config.monitor.autostart);

    // 音频配置
    println!("cargo:rustc-env=AUDIO_CAPTURE_DEVICE={}", config.audio.capture_device);
    println!("cargo:rustc-env=AUDIO_PLAYBACK_DEVICE={}", config.audio.playback_device);
    println!("cargo:rustc-env=AUDIO_SAMPLE_RATE={}", config.audio.sample_rate);
    println!("cargo:rustc-env=AUDIO_PLAYBACK_SAMPLE_RATE={}", config.audio.playback_sample_rate);
    println!("cargo:rustc-env=AUDIO_FFT_SIZE={}", config.audio.fft_size);
    println!("cargo:rustc-env=AUDIO_SMOOTHING={}", config.audio.smoothing);
    println!("cargo:rustc-env=AUDIO_MIN_DECIBELS={}", config.audio.min_decibels);
    println!("cargo:rustc-env=AUDIO_MAX_DECIBELS={}", config.audio.max_decibels);

    // UI 进程配置
    println!("cargo:rustc-env=UI_LOCAL_PORT={}", config.ui.local_port);
    println!("cargo:rustc-env=UI_REMOTE_PORT={}", config.ui.remote_port);
    println!("cargo:rustc-env=UI_BUFFER_SIZE={}", config.ui.buffer_size);
}
