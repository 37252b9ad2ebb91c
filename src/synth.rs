//! Procedural alert sounds.
//!
//! Every [`SoundKind`] maps to a fixed recipe: a [`SoundEvent`] made of one or
//! more oscillator voices whose frequency and gain follow breakpoint
//! automation. Events are plain data; turning them into sound is the job of a
//! [`SoundOutput`] adapter, and [`render`] produces the PCM those adapters write.

use async_trait::async_trait;
use std::f32::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::AudioError;

/// Exponential ramps are undefined towards zero, so targets never go below this.
pub const RAMP_FLOOR: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundKind {
    Beep,
    Smack,
    Seagull,
    Meow,
    Bark,
}

impl SoundKind {
    pub const ALL: [SoundKind; 5] = [
        SoundKind::Beep,
        SoundKind::Smack,
        SoundKind::Seagull,
        SoundKind::Meow,
        SoundKind::Bark,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SoundKind::Beep => "Beep",
            SoundKind::Smack => "Smack",
            SoundKind::Seagull => "Seagull",
            SoundKind::Meow => "Meow",
            SoundKind::Bark => "Bark",
        }
    }

    /// Build the recipe for this kind at the given master volume.
    pub fn event(self, volume: f32) -> SoundEvent {
        let voices = match self {
            // 简单正弦波
            SoundKind::Beep => vec![Voice {
                waveform: Waveform::Sine,
                start: 0.0,
                stop: 0.2,
                frequency: Automation::constant(800.0),
                gain: Automation::constant(1.0),
            }],
            // 低频短促，频率和音量都指数下降
            SoundKind::Smack => vec![Voice {
                waveform: Waveform::Sine,
                start: 0.0,
                stop: 0.15,
                frequency: Automation::constant(300.0).exponential_to(100.0, 0.1),
                gain: Automation::constant(1.0).exponential_to(RAMP_FLOOR, 0.15),
            }],
            SoundKind::Seagull => vec![Voice {
                waveform: Waveform::Sawtooth,
                start: 0.0,
                stop: 0.5,
                frequency: Automation::constant(1000.0)
                    .linear_to(1500.0, 0.1)
                    .linear_to(800.0, 0.3)
                    .linear_to(1200.0, 0.4)
                    .linear_to(600.0, 0.5),
                gain: Automation::constant(0.5).linear_to(RAMP_FLOOR, 0.5),
            }],
            SoundKind::Meow => vec![Voice {
                waveform: Waveform::Sine,
                start: 0.0,
                stop: 0.4,
                frequency: Automation::constant(700.0)
                    .linear_to(500.0, 0.2)
                    .linear_to(400.0, 0.4),
                gain: Automation::constant(0.8).linear_to(RAMP_FLOOR, 0.4),
            }],
            // 两声短促方波
            SoundKind::Bark => (0..2)
                .map(|i| {
                    let start = i as f32 * 0.15;
                    Voice {
                        waveform: Waveform::Square,
                        start,
                        stop: start + 0.1,
                        frequency: Automation::default()
                            .set(400.0, start)
                            .exponential_to(200.0, start + 0.1),
                        gain: Automation::default()
                            .set(0.6, start)
                            .exponential_to(RAMP_FLOOR, start + 0.1),
                    }
                })
                .collect(),
        };

        let duration = Duration::from_millis(match self {
            SoundKind::Beep => 200,
            SoundKind::Smack => 150,
            SoundKind::Seagull => 500,
            SoundKind::Meow => 400,
            SoundKind::Bark => 300,
        });

        SoundEvent {
            kind: self,
            volume,
            duration,
            voices,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
}

impl Waveform {
    /// Sample the waveform at `phase` in cycles, `0.0..1.0`.
    pub fn sample(self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (2.0 * PI * phase).sin(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * phase - 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ramp {
    /// Jump to the value at the breakpoint time.
    Set,
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breakpoint {
    pub time: f32,
    pub value: f32,
    pub ramp: Ramp,
}

/// Value-over-time curve with the same ramp rules as a browser audio param:
/// a ramp interpolates from the previous breakpoint up to its own time, and
/// the last value holds afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Automation {
    points: Vec<Breakpoint>,
}

impl Automation {
    pub fn constant(value: f32) -> Self {
        Self::default().set(value, 0.0)
    }

    pub fn set(mut self, value: f32, time: f32) -> Self {
        self.points.push(Breakpoint {
            time,
            value,
            ramp: Ramp::Set,
        });
        self
    }

    pub fn linear_to(mut self, value: f32, time: f32) -> Self {
        self.points.push(Breakpoint {
            time,
            value,
            ramp: Ramp::Linear,
        });
        self
    }

    /// Exponential ramp; the target is floored at [`RAMP_FLOOR`].
    pub fn exponential_to(mut self, value: f32, time: f32) -> Self {
        self.points.push(Breakpoint {
            time,
            value: value.max(RAMP_FLOOR),
            ramp: Ramp::Exponential,
        });
        self
    }

    pub fn value_at(&self, t: f32) -> f32 {
        let Some(first) = self.points.first() else {
            return 0.0;
        };
        if t < first.time {
            return first.value;
        }

        // index of the first breakpoint strictly after t
        let next = self.points.partition_point(|p| p.time <= t);
        let prev = self.points[next - 1];
        let Some(target) = self.points.get(next) else {
            return prev.value;
        };

        let span = target.time - prev.time;
        if span <= 0.0 {
            return prev.value;
        }
        let x = (t - prev.time) / span;
        match target.ramp {
            Ramp::Set => prev.value,
            Ramp::Linear => prev.value + (target.value - prev.value) * x,
            Ramp::Exponential => {
                if prev.value <= 0.0 {
                    prev.value
                } else {
                    prev.value * (target.value / prev.value).powf(x)
                }
            }
        }
    }
}

/// One oscillator inside an event, active on `start..stop` seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Voice {
    pub waveform: Waveform,
    pub start: f32,
    pub stop: f32,
    pub frequency: Automation,
    pub gain: Automation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoundEvent {
    pub kind: SoundKind,
    /// Master gain applied on top of every voice's own gain curve.
    pub volume: f32,
    /// Time from event start until the event is finished.
    pub duration: Duration,
    pub voices: Vec<Voice>,
}

/// Render an event to mono f32 PCM.
pub fn render(event: &SoundEvent, sample_rate: u32) -> Vec<f32> {
    let rate = sample_rate as f32;
    let total = (event.duration.as_micros() * sample_rate as u128 / 1_000_000) as usize;
    let mut out = vec![0.0f32; total];

    for voice in &event.voices {
        let first = (voice.start * rate).round() as usize;
        let last = ((voice.stop * rate).round() as usize).min(total);
        let mut phase = 0.0f32;
        for (i, sample) in out.iter_mut().enumerate().take(last).skip(first) {
            let t = i as f32 / rate;
            *sample += voice.waveform.sample(phase) * voice.gain.value_at(t);
            phase = (phase + voice.frequency.value_at(t) / rate).fract();
        }
    }

    for sample in &mut out {
        *sample *= event.volume;
    }
    out
}

/// Binds sound events to an actual output device.
#[async_trait]
pub trait SoundOutput: Send + Sync {
    /// Start playing `event` and resolve once it is submitted; the adapter
    /// releases its resources on its own once the event is over.
    async fn play(&self, event: &SoundEvent) -> Result<(), AudioError>;
}

/// Plays recipes through an output and waits for them to finish.
pub struct ToneSynthesizer {
    output: Arc<dyn SoundOutput>,
    clock: Arc<dyn Clock>,
}

impl ToneSynthesizer {
    pub fn new(output: Arc<dyn SoundOutput>, clock: Arc<dyn Clock>) -> Self {
        Self { output, clock }
    }

    /// Play `kind` at `volume`, resolving once the recipe's duration has elapsed.
    pub async fn play(&self, kind: SoundKind, volume: f32) -> Result<(), AudioError> {
        let event = kind.event(volume);
        self.output.play(&event).await?;
        self.clock.sleep(event.duration).await;
        Ok(())
    }
}
