use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::synth::SoundKind;

pub const MAX_VOLUME: f32 = 1.0;
pub const VOLUME_STEP: f32 = 0.15;

/// Volume for the alert after one played at `current`.
pub fn next_volume(current: f32) -> f32 {
    (current + VOLUME_STEP).min(MAX_VOLUME)
}

/// Per-session alert bookkeeping: how many times the threshold was breached
/// and how loud the next alert plays.
#[derive(Debug)]
pub struct AlertEscalator {
    rng: StdRng,
    current_volume: f32,
    trigger_count: u32,
}

impl AlertEscalator {
    pub fn new(base_volume: f32, rng: StdRng) -> Self {
        Self {
            rng,
            current_volume: base_volume.clamp(0.0, MAX_VOLUME),
            trigger_count: 0,
        }
    }

    /// Uniform pick from the catalog, independent of previous picks.
    pub fn choose_sound(&mut self) -> SoundKind {
        *SoundKind::ALL
            .choose(&mut self.rng)
            .unwrap_or(&SoundKind::Beep)
    }

    pub fn record_trigger(&mut self) -> u32 {
        self.trigger_count += 1;
        self.trigger_count
    }

    /// Raise the volume one step after a finished alert.
    pub fn escalate(&mut self) -> f32 {
        self.current_volume = next_volume(self.current_volume);
        self.current_volume
    }

    pub fn current_volume(&self) -> f32 {
        self.current_volume
    }

    pub fn trigger_count(&self) -> u32 {
        self.trigger_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_next_volume_steps_and_clamps() {
        assert!((next_volume(0.3) - 0.45).abs() < 1e-6);
        assert_eq!(next_volume(0.9), 1.0);
        assert_eq!(next_volume(1.0), 1.0);
        assert!((next_volume(0.0) - 0.15).abs() < 1e-6);
    }

    #[test]
    fn test_escalation_is_monotonic_and_capped() {
        let mut escalator = AlertEscalator::new(0.3, StdRng::seed_from_u64(1));
        let mut last = escalator.current_volume();
        for _ in 0..10 {
            let v = escalator.escalate();
            assert!(v >= last);
            assert!(v <= MAX_VOLUME);
            last = v;
        }
        assert_eq!(last, MAX_VOLUME);
    }

    #[test]
    fn test_record_trigger_counts_up() {
        let mut escalator = AlertEscalator::new(0.3, StdRng::seed_from_u64(1));
        assert_eq!(escalator.trigger_count(), 0);
        assert_eq!(escalator.record_trigger(), 1);
        assert_eq!(escalator.record_trigger(), 2);
        assert_eq!(escalator.trigger_count(), 2);
    }

    #[test]
    fn test_choose_sound_is_seed_deterministic() {
        let mut a = AlertEscalator::new(0.3, StdRng::seed_from_u64(42));
        let mut b = AlertEscalator::new(0.3, StdRng::seed_from_u64(42));
        let picks_a: Vec<_> = (0..20).map(|_| a.choose_sound()).collect();
        let picks_b: Vec<_> = (0..20).map(|_| b.choose_sound()).collect();
        assert_eq!(picks_a, picks_b);
    }

    #[test]
    fn test_choose_sound_covers_catalog() {
        let mut escalator = AlertEscalator::new(0.3, StdRng::seed_from_u64(7));
        let seen: HashSet<_> = (0..500).map(|_| escalator.choose_sound()).collect();
        assert_eq!(seen.len(), SoundKind::ALL.len());
    }
}
