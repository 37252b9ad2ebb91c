//! Microphone capture feeding the spectrum analyser.
//!
//! Uses a dedicated std::thread for the blocking ALSA reads; the monitor only
//! ever looks at the latest analysis window through a shared buffer. The
//! thread is never joined from async code: disconnecting clears the running
//! flag and the thread closes the device after its current read.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use anyhow::Result;

use super::alsa_device::{self, AlsaParams, StreamRequest};
use super::analyser::{Analyser, AnalyserConfig};
use crate::error::AudioError;
use crate::sampler::{FrequencySource, InputProvider};

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// ALSA capture device name (e.g. "default", "plughw:0,0")
    pub device: String,
    pub sample_rate: u32,
    pub channels: u32,
    pub analyser: AnalyserConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: "default".to_string(),
            sample_rate: 48000,
            channels: 1,
            analyser: AnalyserConfig::default(),
        }
    }
}

/// Opens the ALSA microphone on demand.
pub struct AlsaInput {
    config: CaptureConfig,
}

impl AlsaInput {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl InputProvider for AlsaInput {
    async fn connect(&self) -> Result<Box<dyn FrequencySource>, AudioError> {
        let config = self.config.clone();
        let stream = tokio::task::spawn_blocking(move || CaptureStream::open(config))
            .await
            .map_err(|e| AudioError::PermissionDenied(e.to_string()))?
            .map_err(|e| AudioError::PermissionDenied(format!("{:#}", e)))?;
        Ok(Box::new(stream))
    }
}

/// A running capture thread plus the analyser reading from it.
pub struct CaptureStream {
    window: Arc<Mutex<VecDeque<f32>>>,
    running: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    analyser: Analyser,
    snapshot: Vec<f32>,
}

impl CaptureStream {
    fn open(config: CaptureConfig) -> Result<Self> {
        let analyser = Analyser::new(config.analyser.clone());

        // 请求较小的 period，保证分析窗口足够新
        let (pcm, params) = alsa_device::open_capture(&StreamRequest {
            device: &config.device,
            sample_rate: config.sample_rate,
            channels: config.channels,
            period_size: Some(analyser.fft_size()),
        })?;

        Self::spawn(analyser, move |window, running| {
            capture_thread(&pcm, params, window, running)
        })
    }

    /// Run `reader` on its own thread, feeding the analysis window until the
    /// running flag is cleared.
    fn spawn<F>(analyser: Analyser, reader: F) -> Result<Self>
    where
        F: FnOnce(&Mutex<VecDeque<f32>>, &AtomicBool) -> Result<()> + Send + 'static,
    {
        let window_len = analyser.fft_size();
        let window = Arc::new(Mutex::new(VecDeque::from(vec![0.0; window_len])));
        let running = Arc::new(AtomicBool::new(true));
        let alive = Arc::new(AtomicBool::new(true));

        {
            let window = window.clone();
            let running = running.clone();
            let alive = alive.clone();
            thread::Builder::new()
                .name("mic-capture".into())
                .spawn(move || {
                    if let Err(e) = reader(&window, &running) {
                        log::error!("Capture thread error: {}", e);
                    }
                    alive.store(false, Ordering::SeqCst);
                })?;
        }

        Ok(Self {
            window,
            running,
            alive,
            analyser,
            snapshot: Vec::with_capacity(window_len),
        })
    }

    /// Ask the capture thread to stop; it releases the device on its own.
    pub fn disconnect(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            log::info!("Microphone disconnected");
        }
    }
}

impl FrequencySource for CaptureStream {
    fn bin_count(&self) -> usize {
        self.analyser.bin_count()
    }

    fn byte_frequency_data(&mut self, out: &mut [u8]) -> Result<(), AudioError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(AudioError::Disconnected);
        }
        self.snapshot.clear();
        {
            let window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
            self.snapshot.extend(window.iter().copied());
        }
        self.analyser.byte_frequency_data(&self.snapshot, out);
        Ok(())
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn capture_thread(
    pcm: &alsa::pcm::PCM,
    params: AlsaParams,
    window: &Mutex<VecDeque<f32>>,
    running: &AtomicBool,
) -> Result<()> {
    let channels = params.channels as usize;
    let mut read_buf = vec![0i16; params.period_size * channels];
    let mut mono: Vec<f32> = Vec::with_capacity(params.period_size);

    let io = pcm.io_i16()?;
    log::info!(
        "Capture started: rate={}, ch={}, period={}",
        params.sample_rate,
        params.channels,
        params.period_size,
    );

    while running.load(Ordering::Relaxed) {
        match io.readi(&mut read_buf) {
            Ok(frames) => {
                mono.clear();
                alsa_device::downmix_to_mono(&read_buf[..frames * channels], channels, &mut mono);

                let mut window = window.lock().unwrap_or_else(PoisonError::into_inner);
                let capacity = window.len();
                window.extend(mono.iter().copied());
                let excess = window.len().saturating_sub(capacity);
                window.drain(..excess);
            }
            Err(e) => {
                log::warn!("ALSA capture error: {}, recovering...", e);
                if let Err(e2) = pcm.prepare() {
                    log::error!("Failed to recover PCM capture: {}", e2);
                    break;
                }
            }
        }
    }

    log::info!("Capture stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn wait_for(flag: &AtomicBool, value: bool) {
        for _ in 0..500 {
            if flag.load(Ordering::SeqCst) == value {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("flag never became {}", value);
    }

    #[test]
    fn test_drop_does_not_wait_for_stalled_reader() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let stream = CaptureStream::spawn(Analyser::new(AnalyserConfig::default()), move |_, _| {
            // stands in for a readi() that never returns
            let _ = release_rx.recv();
            Ok(())
        })
        .unwrap();
        let running = stream.running.clone();
        let alive = stream.alive.clone();

        drop(stream);
        assert!(!running.load(Ordering::SeqCst));
        assert!(alive.load(Ordering::SeqCst));

        drop(release_tx);
        wait_for(&alive, false);
    }

    #[test]
    fn test_reader_fills_window_until_stopped() {
        let mut stream =
            CaptureStream::spawn(Analyser::new(AnalyserConfig::default()), |window, running| {
                while running.load(Ordering::Relaxed) {
                    let mut window = window.lock().unwrap_or_else(PoisonError::into_inner);
                    let capacity = window.len();
                    window.extend(std::iter::repeat_n(0.9, 64));
                    let excess = window.len() - capacity;
                    window.drain(..excess);
                    drop(window);
                    thread::sleep(Duration::from_millis(1));
                }
                Ok(())
            })
            .unwrap();

        let mut out = vec![0u8; stream.bin_count()];
        for _ in 0..500 {
            stream.byte_frequency_data(&mut out).unwrap();
            if out[0] > 0 {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        assert!(out[0] > 0);

        stream.disconnect();
        wait_for(&stream.alive, false);
        assert_eq!(
            stream.byte_frequency_data(&mut out),
            Err(AudioError::Disconnected)
        );
    }
}
