use async_trait::async_trait;
use std::thread;

use anyhow::Result;

use super::alsa_device::{self, StreamRequest};
use crate::error::AudioError;
use crate::synth::{self, SoundEvent, SoundOutput};

#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// ALSA playback device name
    pub device: String,
    pub sample_rate: u32,
    pub channels: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            device: "default".to_string(),
            sample_rate: 48000,
            channels: 2,
        }
    }
}

/// Plays each alert through its own short-lived ALSA handle.
///
/// Opening the device blocks (a busy `hw:` device waits until released), so
/// it happens on the blocking pool; a missing output is still reported to the
/// caller. Writing then happens on a detached thread which drains and closes
/// the device once the event has been written.
pub struct AlsaOutput {
    config: PlaybackConfig,
}

impl AlsaOutput {
    pub fn new(config: PlaybackConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SoundOutput for AlsaOutput {
    async fn play(&self, event: &SoundEvent) -> Result<(), AudioError> {
        let config = self.config.clone();
        let event = event.clone();
        tokio::task::spawn_blocking(move || start_playback(&config, &event))
            .await
            .map_err(|e| AudioError::Playback(e.to_string()))?
    }
}

fn start_playback(config: &PlaybackConfig, event: &SoundEvent) -> Result<(), AudioError> {
    let (pcm, params) = alsa_device::open_playback(&StreamRequest {
        device: &config.device,
        sample_rate: config.sample_rate,
        channels: config.channels,
        period_size: None,
    })
    .map_err(|e| AudioError::Playback(format!("{:#}", e)))?;

    let mono = synth::render(event, params.sample_rate);
    let pcm_data = alsa_device::mono_to_interleaved(&mono, params.channels as usize);
    let kind = event.kind;

    thread::Builder::new()
        .name("alert-play".into())
        .spawn(move || {
            if let Err(e) = write_all(&pcm, &pcm_data, params.channels as usize) {
                log::error!("Alert playback ({:?}) failed: {}", kind, e);
            }
        })
        .map_err(|e| AudioError::Playback(e.to_string()))?;
    Ok(())
}

fn write_all(pcm: &alsa::pcm::PCM, pcm_data: &[i16], channels: usize) -> Result<()> {
    let io = pcm.io_i16()?;

    // Write with retry loop to handle short writes and XRUN recovery.
    let total_frames = pcm_data.len() / channels;
    let mut frames_written = 0;
    let mut retry_count = 0u32;

    while frames_written < total_frames {
        let offset = frames_written * channels;
        match io.writei(&pcm_data[offset..]) {
            Ok(n) => {
                frames_written += n;
                retry_count = 0;
            }
            Err(e) => {
                log::warn!("ALSA XRUN or error: {}, recovering...", e);
                retry_count += 1;
                pcm.prepare()?;
                if retry_count >= 3 {
                    log::error!(
                        "Max recovery retries ({}) reached. Dropping {} unwritten frames.",
                        retry_count,
                        total_frames - frames_written
                    );
                    break;
                }
            }
        }
    }

    pcm.drain()?;
    Ok(())
}
