use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct Config {
    // 监控默认参数，运行时可通过 UI 修改
    pub threshold_percent: u8,
    pub cooldown_seconds: u32,
    pub base_volume: f32,
    pub frame_rate_hz: u32,
    pub autostart: bool,

    // 音频设备配置
    pub capture_device: &'static str,
    pub playback_device: &'static str,
    pub sample_rate: u32,
    pub playback_sample_rate: u32,
    pub fft_size: usize,
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,

    // UI进程配置
    pub ui_local_port: u16,
    pub ui_remote_port: u16,
    pub ui_buffer_size: usize,
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取
    pub fn new() -> Result<Self, &'static str> {
        Ok(Self {
            threshold_percent: env!("MONITOR_THRESHOLD_PERCENT").parse()
                .map_err(|_| "Failed to parse MONITOR_THRESHOLD_PERCENT")?,
            cooldown_seconds: env!("MONITOR_COOLDOWN_SECONDS").parse()
                .map_err(|_| "Failed to parse MONITOR_COOLDOWN_SECONDS")?,
            base_volume: env!("MONITOR_BASE_VOLUME").parse()
                .map_err(|_| "Failed to parse MONITOR_BASE_VOLUME")?,
            frame_rate_hz: env!("MONITOR_FRAME_RATE_HZ").parse()
                .map_err(|_| "Failed to parse MONITOR_FRAME_RATE_HZ")?,
            autostart: env!("MONITOR_AUTOSTART").parse()
                .map_err(|_| "Failed to parse MONITOR_AUTOSTART")?,

            capture_device: env!("AUDIO_CAPTURE_DEVICE"),
            playback_device: env!("AUDIO_PLAYBACK_DEVICE"),
            sample_rate: env!("AUDIO_SAMPLE_RATE").parse()
                .map_err(|_| "Failed to parse AUDIO_SAMPLE_RATE")?,
            playback_sample_rate: env!("AUDIO_PLAYBACK_SAMPLE_RATE").parse()
                .map_err(|_| "Failed to parse AUDIO_PLAYBACK_SAMPLE_RATE")?,
            fft_size: env!("AUDIO_FFT_SIZE").parse()
                .map_err(|_| "Failed to parse AUDIO_FFT_SIZE")?,
            smoothing: env!("AUDIO_SMOOTHING").parse()
                .map_err(|_| "Failed to parse AUDIO_SMOOTHING")?,
            min_decibels: env!("AUDIO_MIN_DECIBELS").parse()
                .map_err(|_| "Failed to parse AUDIO_MIN_DECIBELS")?,
            max_decibels: env!("AUDIO_MAX_DECIBELS").parse()
                .map_err(|_| "Failed to parse AUDIO_MAX_DECIBELS")?,

            ui_local_port: env!("UI_LOCAL_PORT").parse()
                .map_err(|_| "Failed to parse UI_LOCAL_PORT")?,
            ui_remote_port: env!("UI_REMOTE_PORT").parse()
                .map_err(|_| "Failed to parse UI_REMOTE_PORT")?,
            ui_buffer_size: env!("UI_BUFFER_SIZE").parse()
                .map_err(|_| "Failed to parse UI_BUFFER_SIZE")?,
        })
    }

    /// Initial monitoring parameters, before any UI adjustment.
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            threshold_percent: self.threshold_percent.min(100),
            cooldown_seconds: self.cooldown_seconds.max(1),
            base_volume: self.base_volume.clamp(0.0, 1.0),
        }
    }
}

/// The user-adjustable knobs of a monitoring session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub threshold_percent: u8,
    pub cooldown_seconds: u32,
    pub base_volume: f32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            threshold_percent: 30,
            cooldown_seconds: 5,
            base_volume: 0.3,
        }
    }
}

/// Shared, validated view of [`MonitorConfig`].
///
/// The UI writes through the setters at any time; the monitor reads values
/// at the point of use, so a changed cooldown applies to the next pause.
#[derive(Debug, Default)]
pub struct Settings {
    inner: RwLock<MonitorConfig>,
}

impl Settings {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            inner: RwLock::new(config),
        }
    }

    pub fn snapshot(&self) -> MonitorConfig {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn threshold_percent(&self) -> u8 {
        self.snapshot().threshold_percent
    }

    pub fn cooldown_seconds(&self) -> u32 {
        self.snapshot().cooldown_seconds
    }

    pub fn base_volume(&self) -> f32 {
        self.snapshot().base_volume
    }

    pub fn set_threshold_percent(&self, value: u32) -> Result<(), ConfigError> {
        if value > 100 {
            return Err(ConfigError::ThresholdOutOfRange(value));
        }
        self.update(|c| c.threshold_percent = value as u8);
        Ok(())
    }

    pub fn set_cooldown_seconds(&self, value: u32) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::CooldownNotPositive);
        }
        self.update(|c| c.cooldown_seconds = value);
        Ok(())
    }

    pub fn set_base_volume(&self, value: f32) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::VolumeOutOfRange(value));
        }
        self.update(|c| c.base_volume = value);
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut MonitorConfig)) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut *guard);
        log::debug!("Settings updated: {:?}", *guard);
    }
}
