use async_trait::async_trait;

use crate::error::AudioError;

/// A live input stream that can report its current spectrum as byte
/// magnitudes (0..=255 per frequency bin).
pub trait FrequencySource: Send {
    fn bin_count(&self) -> usize;

    /// Fill `out` with the latest magnitudes. Fails once the stream is gone.
    fn byte_frequency_data(&mut self, out: &mut [u8]) -> Result<(), AudioError>;
}

/// Grants access to an input stream. Connecting may be refused.
#[async_trait]
pub trait InputProvider: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn FrequencySource>, AudioError>;
}

/// Mean bin magnitude as a rounded percentage of full scale.
pub fn loudness_percent(bins: &[u8]) -> u8 {
    if bins.is_empty() {
        return 0;
    }
    let sum: u64 = bins.iter().map(|&b| b as u64).sum();
    let average = sum as f64 / bins.len() as f64;
    (average / 255.0 * 100.0).round() as u8
}

/// Turns a connected input stream into loudness readings.
///
/// Dropping the sampler drops the source, which disconnects the stream.
pub struct SignalSampler {
    source: Box<dyn FrequencySource>,
    bins: Vec<u8>,
}

impl SignalSampler {
    pub fn new(source: Box<dyn FrequencySource>) -> Self {
        let bins = vec![0u8; source.bin_count()];
        Self { source, bins }
    }

    /// Current loudness, 0..=100.
    pub fn sample(&mut self) -> Result<u8, AudioError> {
        self.source.byte_frequency_data(&mut self.bins)?;
        Ok(loudness_percent(&self.bins))
    }
}
