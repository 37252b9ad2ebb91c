//! ALSA PCM device wrappers for microphone capture and alert playback.

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};
use anyhow::{Context, Result};

/// What we ask ALSA for; the hardware may negotiate something else.
#[derive(Debug, Clone)]
pub struct StreamRequest<'a> {
    pub device: &'a str,
    pub sample_rate: u32,
    pub channels: u32,
    /// Period size in frames, `None` lets ALSA decide
    pub period_size: Option<usize>,
}

/// Parameters negotiated with the ALSA hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlsaParams {
    pub sample_rate: u32,
    pub channels: u32,
    /// Period size in frames (one frame = channels × sample_width)
    pub period_size: usize,
}

/// Open the microphone. Small periods keep the analysis window fresh.
pub fn open_capture(request: &StreamRequest) -> Result<(PCM, AlsaParams)> {
    open_pcm(request, Direction::Capture)
}

pub fn open_playback(request: &StreamRequest) -> Result<(PCM, AlsaParams)> {
    open_pcm(request, Direction::Playback)
}

fn open_pcm(request: &StreamRequest, direction: Direction) -> Result<(PCM, AlsaParams)> {
    let dir_name = match direction {
        Direction::Capture => "Capture",
        Direction::Playback => "Playback",
    };
    let pcm = PCM::new(request.device, direction, false).with_context(|| {
        format!("Failed to open PCM device '{}' for {}", request.device, dir_name)
    })?;

    {
        let hwp = HwParams::any(&pcm).context("Failed to initialize HwParams")?;
        hwp.set_access(Access::RWInterleaved)?;
        hwp.set_format(Format::S16LE)?;
        hwp.set_channels(request.channels)?;
        hwp.set_rate_near(request.sample_rate, ValueOr::Nearest)?;
        if let Some(ps) = request.period_size {
            hwp.set_period_size_near(ps as alsa::pcm::Frames, ValueOr::Nearest)?;
        }
        pcm.hw_params(&hwp)
            .with_context(|| format!("Device '{}' rejected {} parameters", request.device, dir_name))?;
    }

    let params = {
        let hwp = pcm.hw_params_current()?;
        AlsaParams {
            sample_rate: hwp.get_rate()?,
            channels: hwp.get_channels()?,
            period_size: hwp.get_period_size()? as usize,
        }
    };

    log::info!(
        "ALSA {}: device={}, rate={}, channels={}, period_size={}",
        dir_name,
        request.device,
        params.sample_rate,
        params.channels,
        params.period_size,
    );

    Ok((pcm, params))
}

/// Average interleaved i16 frames down to mono f32 in `-1.0..1.0`.
pub fn downmix_to_mono(interleaved: &[i16], channels: usize, out: &mut Vec<f32>) {
    let channels = channels.max(1);
    out.extend(interleaved.chunks_exact(channels).map(|frame| {
        let sum: f32 = frame.iter().map(|&s| s as f32).sum();
        sum / channels as f32 / 32768.0
    }));
}

/// Convert mono f32 PCM to interleaved i16, copying each sample to every channel.
pub fn mono_to_interleaved(mono: &[f32], channels: usize) -> Vec<i16> {
    let channels = channels.max(1);
    let mut out = Vec::with_capacity(mono.len() * channels);
    for &s in mono {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        out.extend(std::iter::repeat_n(v, channels));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_averages_channels() {
        let mut mono = Vec::new();
        downmix_to_mono(&[16384, 0, -16384, -16384], 2, &mut mono);
        assert_eq!(mono, vec![0.25, -0.5]);
    }

    #[test]
    fn test_downmix_drops_partial_frame() {
        let mut mono = vec![0.5];
        downmix_to_mono(&[32767, -32768, 8192], 2, &mut mono);
        // appends to what is already there, trailing half frame is ignored
        assert_eq!(mono.len(), 2);
        assert_eq!(mono[0], 0.5);
        assert_eq!(mono[1], -0.5 / 32768.0);

        let mut single = Vec::new();
        downmix_to_mono(&[-32768, 16384], 1, &mut single);
        assert_eq!(single, vec![-1.0, 0.5]);
    }

    #[test]
    fn test_mono_to_interleaved_clamps() {
        let pcm = mono_to_interleaved(&[1.5, -1.2, 0.5], 1);
        assert_eq!(pcm, vec![i16::MAX, -i16::MAX, 16383]);
        assert!(mono_to_interleaved(&[], 2).is_empty());
    }

    #[test]
    fn test_mono_to_interleaved_duplicates() {
        let pcm = mono_to_interleaved(&[1.0, 0.0, -2.0], 2);
        assert_eq!(pcm, vec![i16::MAX, i16::MAX, 0, 0, -i16::MAX, -i16::MAX]);
    }
}
