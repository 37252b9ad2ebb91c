use thiserror::Error;

/// Failures coming out of the audio input/output layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AudioError {
    /// Capture device could not be opened (denied, busy or missing).
    #[error("no audio access: {0}")]
    PermissionDenied(String),
    /// The capture stream was closed or its thread exited.
    #[error("audio input disconnected")]
    Disconnected,
    #[error("playback unavailable: {0}")]
    Playback(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MonitorError {
    #[error("cannot start monitoring: {0}")]
    NoAudioAccess(AudioError),
    #[error("monitoring is already running")]
    AlreadyRunning,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("threshold must be within 0..=100, got {0}")]
    ThresholdOutOfRange(u32),
    #[error("cooldown must be at least one second")]
    CooldownNotPositive,
    #[error("volume must be within 0.0..=1.0, got {0}")]
    VolumeOutOfRange(f32),
}
