//! audio - Microphone capture, spectrum analysis and alert playback
//!
//! Uses ALSA for audio I/O and rustfft for the analyser that turns the
//! microphone signal into per-bin byte magnitudes.

mod alsa_device;
mod analyser;
mod capture;
mod playback;

pub use analyser::AnalyserConfig;
pub use capture::{AlsaInput, CaptureConfig};
pub use playback::{AlsaOutput, PlaybackConfig};
