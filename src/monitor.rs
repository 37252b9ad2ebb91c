//! The monitoring session: sample loudness every frame, play an alert burst
//! when it crosses the threshold, then pause before listening again.
//!
//! Phases run `Idle → Sampling → Alerting → Cooldown → Sampling → …` until
//! [`Monitor::stop`]. Each session gets its own running flag; every wait in
//! the session task re-checks that flag when it resumes, so a timer that
//! fires after a stop never schedules more work.

use rand::RngCore;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::config::Settings;
use crate::error::{AudioError, MonitorError};
use crate::escalator::AlertEscalator;
use crate::sampler::{InputProvider, SignalSampler};
use crate::synth::{SoundKind, SoundOutput, ToneSynthesizer};

/// Each alert plays its sound this many times.
pub const ALERT_REPEATS: usize = 3;
/// Silence after every playback inside an alert.
pub const ALERT_GAP: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Sampling,
    Alerting,
    Cooldown,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorState {
    pub phase: Phase,
    pub running: bool,
    pub current_volume: f32,
    pub trigger_count: u32,
}

/// Human-facing status line.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Monitoring,
    Triggered { sound: SoundKind, volume_percent: u8 },
    Paused { seconds: u32 },
    Stopped,
    NoAudioAccess,
}

impl Status {
    /// Whether the UI should highlight this status.
    pub fn is_alert(&self) -> bool {
        matches!(self, Status::Triggered { .. } | Status::NoAudioAccess)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Monitoring => write!(f, "Monitoring active..."),
            Status::Triggered {
                sound,
                volume_percent,
            } => write!(f, "Snore! Sound: {} ({}%)", sound.label(), volume_percent),
            Status::Paused { seconds } => write!(f, "Pause {} sec...", seconds),
            Status::Stopped => write!(f, "Monitoring stopped"),
            Status::NoAudioAccess => write!(f, "Error: no microphone access"),
        }
    }
}

/// Everything the monitor wants the UI to render.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    /// Live loudness, 0..=100
    Level(u8),
    Status(Status),
    Triggers(u32),
}

struct Session {
    id: u64,
    running: AtomicBool,
    stopped: Notify,
    phase: Mutex<Phase>,
    sampler: Mutex<Option<SignalSampler>>,
    escalator: Mutex<AlertEscalator>,
}

impl Session {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Clear the running flag, wake a pending cooldown and drop the input.
    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stopped.notify_waiters();
        let sampler = self
            .sampler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sampler);
    }

    /// `None` once the session is stopped.
    fn sample(&self) -> Option<Result<u8, AudioError>> {
        let mut sampler = self.sampler.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.is_running() {
            return None;
        }
        sampler.as_mut().map(SignalSampler::sample)
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn escalator(&self) -> std::sync::MutexGuard<'_, AlertEscalator> {
        self.escalator.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drive `fut` unless the session is stopped first; `None` on stop.
    async fn unless_stopped<F: Future>(&self, fut: F) -> Option<F::Output> {
        let stopped = self.stopped.notified();
        if !self.is_running() {
            return None;
        }
        tokio::select! {
            output = fut => Some(output),
            _ = stopped => None,
        }
    }
}

/// Owns at most one running monitoring session.
pub struct Monitor {
    input: Arc<dyn InputProvider>,
    output: Arc<dyn SoundOutput>,
    clock: Arc<dyn Clock>,
    settings: Arc<Settings>,
    display: mpsc::UnboundedSender<DisplayEvent>,
    rng: StdRng,
    next_id: u64,
    session: Option<Arc<Session>>,
    // 旧会话的任务可能还在收尾，全部保留到 join
    tasks: Vec<JoinHandle<()>>,
}

impl Monitor {
    pub fn new(
        input: Arc<dyn InputProvider>,
        output: Arc<dyn SoundOutput>,
        clock: Arc<dyn Clock>,
        settings: Arc<Settings>,
        display: mpsc::UnboundedSender<DisplayEvent>,
        rng: StdRng,
    ) -> Self {
        Self {
            input,
            output,
            clock,
            settings,
            display,
            rng,
            next_id: 1,
            session: None,
            tasks: Vec::new(),
        }
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_running())
    }

    pub fn phase(&self) -> Phase {
        match &self.session {
            Some(s) if s.is_running() => s.phase(),
            _ => Phase::Idle,
        }
    }

    /// Snapshot of the latest session, running or not.
    pub fn state(&self) -> MonitorState {
        match &self.session {
            Some(session) => {
                let escalator = session.escalator();
                MonitorState {
                    phase: self.phase(),
                    running: session.is_running(),
                    current_volume: escalator.current_volume(),
                    trigger_count: escalator.trigger_count(),
                }
            }
            None => MonitorState {
                phase: Phase::Idle,
                running: false,
                current_volume: self.settings.base_volume(),
                trigger_count: 0,
            },
        }
    }

    /// Acquire the microphone and begin sampling.
    ///
    /// Nothing about the previous session changes unless the input is granted.
    pub async fn start(&mut self) -> Result<(), MonitorError> {
        if self.is_running() {
            log::warn!("Start requested while monitoring is already running");
            return Err(MonitorError::AlreadyRunning);
        }

        let source = match self.input.connect().await {
            Ok(source) => source,
            Err(e) => {
                log::error!("Microphone access failed: {}", e);
                self.show(DisplayEvent::Status(Status::NoAudioAccess));
                return Err(MonitorError::NoAudioAccess(e));
            }
        };

        let base_volume = self.settings.base_volume();
        let escalator = AlertEscalator::new(base_volume, StdRng::seed_from_u64(self.rng.next_u64()));
        let session = Arc::new(Session {
            id: self.next_id,
            running: AtomicBool::new(true),
            stopped: Notify::new(),
            phase: Mutex::new(Phase::Sampling),
            sampler: Mutex::new(Some(SignalSampler::new(source))),
            escalator: Mutex::new(escalator),
        });
        self.next_id += 1;

        log::info!(
            "Session {} started: threshold={}%, cooldown={}s, volume={:.2}",
            session.id,
            self.settings.threshold_percent(),
            self.settings.cooldown_seconds(),
            base_volume,
        );
        self.show(DisplayEvent::Triggers(0));
        self.show(DisplayEvent::Status(Status::Monitoring));

        let runner = SessionRunner {
            session: session.clone(),
            synth: ToneSynthesizer::new(self.output.clone(), self.clock.clone()),
            clock: self.clock.clone(),
            settings: self.settings.clone(),
            display: self.display.clone(),
        };
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(tokio::spawn(runner.run()));
        self.session = Some(session);
        Ok(())
    }

    /// Stop monitoring. Volume and trigger count are kept until the next start.
    pub fn stop(&mut self) {
        if let Some(session) = &self.session {
            if session.is_running() {
                log::info!("Session {} stopped", session.id);
            }
            session.stop();
        }
        self.show(DisplayEvent::Status(Status::Stopped));
        self.show(DisplayEvent::Level(0));
    }

    /// Wait for every session task to wind down after a stop.
    pub async fn join(&mut self) {
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                log::error!("Session task failed: {}", e);
            }
        }
    }

    fn show(&self, event: DisplayEvent) {
        // the UI side may already be gone during shutdown
        let _ = self.display.send(event);
    }
}

struct SessionRunner {
    session: Arc<Session>,
    synth: ToneSynthesizer,
    clock: Arc<dyn Clock>,
    settings: Arc<Settings>,
    display: mpsc::UnboundedSender<DisplayEvent>,
}

impl SessionRunner {
    async fn run(self) {
        loop {
            let level = match self.session.sample() {
                Some(Ok(level)) => level,
                Some(Err(e)) => {
                    log::error!("Session {}: input lost: {}", self.session.id, e);
                    self.session.stop();
                    self.show(DisplayEvent::Status(Status::NoAudioAccess));
                    self.show(DisplayEvent::Level(0));
                    break;
                }
                None => break,
            };

            log::trace!("level={}%", level);
            self.show(DisplayEvent::Level(level));

            if level > self.settings.threshold_percent() {
                self.alert(level).await;
                if !self.session.is_running() {
                    break;
                }
                self.cooldown().await;
                if !self.session.is_running() {
                    break;
                }
                self.session.set_phase(Phase::Sampling);
                self.show(DisplayEvent::Status(Status::Monitoring));
            } else {
                self.clock.next_frame().await;
            }
        }

        self.session.set_phase(Phase::Idle);
        log::debug!("Session {} task finished", self.session.id);
    }

    async fn alert(&self, level: u8) {
        self.session.set_phase(Phase::Alerting);

        let (sound, volume, count) = {
            let mut escalator = self.session.escalator();
            let count = escalator.record_trigger();
            (escalator.choose_sound(), escalator.current_volume(), count)
        };

        log::info!(
            "Snore detected (level {}%), trigger #{}: {} at {:.0}%",
            level,
            count,
            sound.label(),
            volume * 100.0
        );
        self.show(DisplayEvent::Triggers(count));
        self.show(DisplayEvent::Status(Status::Triggered {
            sound,
            volume_percent: (volume * 100.0).round() as u8,
        }));

        for _ in 0..ALERT_REPEATS {
            match self.session.unless_stopped(self.synth.play(sound, volume)).await {
                Some(Ok(())) => {}
                Some(Err(e)) => {
                    // the burst is dropped but the cycle carries on
                    log::warn!("Alert sound unavailable, skipping rest of burst: {}", e);
                    break;
                }
                None => return,
            }
            if self.session.unless_stopped(self.clock.sleep(ALERT_GAP)).await.is_none() {
                return;
            }
        }

        let next = self.session.escalator().escalate();
        log::debug!("Next alert volume: {:.2}", next);
    }

    async fn cooldown(&self) {
        self.session.set_phase(Phase::Cooldown);
        let seconds = self.settings.cooldown_seconds();
        self.show(DisplayEvent::Status(Status::Paused { seconds }));

        let pause = self.clock.sleep(Duration::from_secs(seconds as u64));
        if self.session.unless_stopped(pause).await.is_none() {
            log::debug!("Session {}: cooldown cancelled", self.session.id);
        }
    }

    fn show(&self, event: DisplayEvent) {
        let _ = self.display.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FrameClock;
    use crate::config::MonitorConfig;
    use crate::sampler::FrequencySource;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::Instant;

    /// Byte magnitude that reads back as `percent` loudness.
    fn byte_for(percent: u8) -> u8 {
        (percent as f64 * 2.55).round() as u8
    }

    #[derive(Clone, Default)]
    struct Script {
        levels: Arc<Mutex<VecDeque<u8>>>,
        samples: Arc<AtomicUsize>,
        disconnected: Arc<AtomicBool>,
    }

    impl Script {
        fn new(levels: &[u8]) -> Self {
            let script = Self::default();
            script.levels.lock().unwrap().extend(levels);
            script
        }

        fn samples(&self) -> usize {
            self.samples.load(Ordering::SeqCst)
        }
    }

    /// Plays back scripted levels; the last one repeats forever.
    struct ScriptedSource {
        script: Script,
    }

    impl FrequencySource for ScriptedSource {
        fn bin_count(&self) -> usize {
            4
        }

        fn byte_frequency_data(&mut self, out: &mut [u8]) -> Result<(), AudioError> {
            if self.script.disconnected.load(Ordering::SeqCst) {
                return Err(AudioError::Disconnected);
            }
            self.script.samples.fetch_add(1, Ordering::SeqCst);
            let mut levels = self.script.levels.lock().unwrap();
            let level = if levels.len() > 1 {
                levels.pop_front().unwrap_or(0)
            } else {
                levels.front().copied().unwrap_or(0)
            };
            out.fill(byte_for(level));
            Ok(())
        }
    }

    struct FakeInput {
        script: Script,
        deny: AtomicBool,
    }

    #[async_trait]
    impl InputProvider for FakeInput {
        async fn connect(&self) -> Result<Box<dyn FrequencySource>, AudioError> {
            if self.deny.load(Ordering::SeqCst) {
                return Err(AudioError::PermissionDenied("denied by user".into()));
            }
            Ok(Box::new(ScriptedSource {
                script: self.script.clone(),
            }))
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Played {
        kind: SoundKind,
        volume: f32,
        at: Instant,
    }

    #[derive(Default)]
    struct FakeOutput {
        played: Mutex<Vec<Played>>,
        attempts: AtomicUsize,
        broken: AtomicBool,
        /// Never finishes submitting, like a device held by someone else.
        stalled: AtomicBool,
    }

    impl FakeOutput {
        fn played(&self) -> Vec<Played> {
            self.played.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SoundOutput for FakeOutput {
        async fn play(&self, event: &crate::synth::SoundEvent) -> Result<(), AudioError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.stalled.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.broken.load(Ordering::SeqCst) {
                return Err(AudioError::Playback("no output device".into()));
            }
            self.played.lock().unwrap().push(Played {
                kind: event.kind,
                volume: event.volume,
                at: Instant::now(),
            });
            Ok(())
        }
    }

    /// Frame clock that remembers every fixed wait.
    struct RecordingClock {
        inner: FrameClock,
        sleeps: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Clock for RecordingClock {
        async fn next_frame(&self) {
            self.inner.next_frame().await;
        }

        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
            self.inner.sleep(duration).await;
        }
    }

    struct Harness {
        monitor: Monitor,
        script: Script,
        input: Arc<FakeInput>,
        output: Arc<FakeOutput>,
        clock: Arc<RecordingClock>,
        display: mpsc::UnboundedReceiver<DisplayEvent>,
    }

    impl Harness {
        fn new(levels: &[u8], config: MonitorConfig) -> Self {
            let script = Script::new(levels);
            let input = Arc::new(FakeInput {
                script: script.clone(),
                deny: AtomicBool::new(false),
            });
            let output = Arc::new(FakeOutput::default());
            let clock = Arc::new(RecordingClock {
                inner: FrameClock::new(60),
                sleeps: Mutex::new(Vec::new()),
            });
            let (tx, rx) = mpsc::unbounded_channel();
            let monitor = Monitor::new(
                input.clone(),
                output.clone(),
                clock.clone(),
                Arc::new(Settings::new(config)),
                tx,
                StdRng::seed_from_u64(99),
            );
            Self {
                monitor,
                script,
                input,
                output,
                clock,
                display: rx,
            }
        }

        fn events(&mut self) -> Vec<DisplayEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.display.try_recv() {
                events.push(event);
            }
            events
        }

        fn statuses(&mut self) -> Vec<Status> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    DisplayEvent::Status(s) => Some(s),
                    _ => None,
                })
                .collect()
        }
    }

    fn config(threshold_percent: u8, cooldown_seconds: u32) -> MonitorConfig {
        MonitorConfig {
            threshold_percent,
            cooldown_seconds,
            base_volume: 0.3,
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..100_000 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition never became true");
    }

    async fn settle(duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_breach_plays_three_times_then_cools_down() {
        let mut h = Harness::new(&[45, 10], config(30, 5));
        h.monitor.start().await.unwrap();

        let output = h.output.clone();
        wait_until(|| output.played().len() == 3).await;
        let monitor = &h.monitor;
        wait_until(|| monitor.phase() == Phase::Cooldown).await;

        let played = h.output.played();
        assert!(played.iter().all(|p| p.kind == played[0].kind));
        assert!(played.iter().all(|p| (p.volume - 0.3).abs() < 1e-6));

        let duration = played[0].kind.event(0.3).duration;
        for pair in played.windows(2) {
            assert_eq!(pair[1].at - pair[0].at, duration + ALERT_GAP);
        }

        let sleeps = h.clock.sleeps.lock().unwrap().clone();
        assert_eq!(
            sleeps[..6],
            [duration, ALERT_GAP, duration, ALERT_GAP, duration, ALERT_GAP]
        );
        assert_eq!(sleeps[6], Duration::from_secs(5));

        let state = h.monitor.state();
        assert_eq!(state.trigger_count, 1);
        assert!(state.running);
        assert!((state.current_volume - 0.45).abs() < 1e-6);

        // back to sampling after the pause, quiet level keeps it there
        settle(Duration::from_secs(6)).await;
        assert_eq!(h.monitor.phase(), Phase::Sampling);
        assert_eq!(h.output.played().len(), 3);

        let events = h.events();
        assert!(events.contains(&DisplayEvent::Level(45)));
        assert!(events.contains(&DisplayEvent::Triggers(1)));
        assert!(events.contains(&DisplayEvent::Status(Status::Triggered {
            sound: played[0].kind,
            volume_percent: 30,
        })));
        assert!(events.contains(&DisplayEvent::Status(Status::Paused { seconds: 5 })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_level_equal_to_threshold_does_not_trigger() {
        let mut h = Harness::new(&[30], config(30, 5));
        h.monitor.start().await.unwrap();

        settle(Duration::from_secs(2)).await;
        assert!(h.script.samples() > 60);
        assert_eq!(h.output.played().len(), 0);
        assert_eq!(h.monitor.state().trigger_count, 0);
        assert_eq!(h.monitor.phase(), Phase::Sampling);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_above_threshold_triggers() {
        let mut h = Harness::new(&[31, 0], config(30, 5));
        h.monitor.start().await.unwrap();

        settle(Duration::from_secs(3)).await;
        assert_eq!(h.monitor.state().trigger_count, 1);
        assert_eq!(h.output.played().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_escalates_across_alerts() {
        let mut h = Harness::new(&[90], config(30, 1));
        h.monitor.start().await.unwrap();

        let output = h.output.clone();
        wait_until(|| output.played().len() >= 18).await;
        h.monitor.stop();

        let volumes: Vec<f32> = h.output.played().iter().map(|p| p.volume).collect();
        let expected = [0.3, 0.45, 0.6, 0.75, 0.9, 1.0];
        for (burst, want) in volumes.chunks(3).zip(expected) {
            assert!(burst.iter().all(|v| (v - want).abs() < 1e-5), "{:?} != {}", burst, want);
        }
        assert!(volumes.windows(2).all(|w| w[1] >= w[0]));
        assert!(volumes.iter().all(|v| *v <= 1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_cooldown_prevents_resume() {
        let mut h = Harness::new(&[45], config(30, 5));
        h.monitor.start().await.unwrap();

        let monitor = &h.monitor;
        wait_until(|| monitor.phase() == Phase::Cooldown).await;
        settle(Duration::from_secs(1)).await;
        h.monitor.stop();
        let samples_at_stop = h.script.samples();

        settle(Duration::from_secs(10)).await;
        assert_eq!(h.script.samples(), samples_at_stop);
        assert_eq!(h.output.played().len(), 3);
        assert_eq!(h.monitor.phase(), Phase::Idle);
        assert!(!h.monitor.state().running);

        // stop keeps the session numbers around
        assert_eq!(h.monitor.state().trigger_count, 1);
        h.monitor.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_alert_skips_cooldown() {
        let mut h = Harness::new(&[45], config(30, 5));
        h.monitor.start().await.unwrap();

        let output = h.output.clone();
        wait_until(|| !output.played().is_empty()).await;
        h.monitor.stop();
        h.monitor.join().await;

        assert!(h.output.played().len() < 3);
        let sleeps = h.clock.sleeps.lock().unwrap().clone();
        assert!(!sleeps.contains(&Duration::from_secs(5)));
        // the unfinished burst does not escalate
        assert!((h.monitor.state().current_volume - 0.3).abs() < 1e-6);
        assert_eq!(h.statuses().last(), Some(&Status::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_leaves_monitor_idle() {
        let mut h = Harness::new(&[45], config(30, 5));
        h.input.deny.store(true, Ordering::SeqCst);

        let err = h.monitor.start().await.unwrap_err();
        assert!(matches!(
            err,
            MonitorError::NoAudioAccess(AudioError::PermissionDenied(_))
        ));
        assert!(!h.monitor.is_running());
        assert_eq!(h.monitor.phase(), Phase::Idle);
        assert_eq!(h.monitor.state().trigger_count, 0);
        assert_eq!(h.script.samples(), 0);
        assert_eq!(h.statuses(), vec![Status::NoAudioAccess]);

        // user retries after granting access
        h.input.deny.store(false, Ordering::SeqCst);
        h.monitor.start().await.unwrap();
        assert!(h.monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_start_keeps_previous_session_numbers() {
        let mut h = Harness::new(&[45], config(30, 5));
        h.monitor.start().await.unwrap();
        let monitor = &h.monitor;
        wait_until(|| monitor.phase() == Phase::Cooldown).await;
        h.monitor.stop();

        h.input.deny.store(true, Ordering::SeqCst);
        assert!(h.monitor.start().await.is_err());
        let state = h.monitor.state();
        assert_eq!(state.trigger_count, 1);
        assert!((state.current_volume - 0.45).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_resets_volume_and_count() {
        let mut h = Harness::new(&[45], config(30, 5));
        h.monitor.start().await.unwrap();
        let monitor = &h.monitor;
        wait_until(|| monitor.phase() == Phase::Cooldown).await;
        h.monitor.stop();
        assert_eq!(h.monitor.state().trigger_count, 1);

        h.monitor.settings().set_base_volume(0.5).unwrap();
        *h.script.levels.lock().unwrap() = VecDeque::from(vec![0]);
        h.monitor.start().await.unwrap();

        let state = h.monitor.state();
        assert!(state.running);
        assert_eq!(state.trigger_count, 0);
        assert_eq!(state.current_volume, 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_running_is_rejected() {
        let mut h = Harness::new(&[0], config(30, 5));
        h.monitor.start().await.unwrap();
        assert_eq!(h.monitor.start().await, Err(MonitorError::AlreadyRunning));

        settle(Duration::from_millis(500)).await;
        // a single loop samples once per frame
        let samples = h.script.samples();
        assert!((28..=32).contains(&samples), "samples = {}", samples);
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_failure_still_reaches_cooldown() {
        let mut h = Harness::new(&[45, 0], config(30, 5));
        h.output.broken.store(true, Ordering::SeqCst);
        h.monitor.start().await.unwrap();

        let monitor = &h.monitor;
        wait_until(|| monitor.phase() == Phase::Cooldown).await;
        assert_eq!(h.output.attempts.load(Ordering::SeqCst), 1);
        assert!(h.output.played().is_empty());
        assert_eq!(h.monitor.state().trigger_count, 1);

        settle(Duration::from_secs(6)).await;
        assert_eq!(h.monitor.phase(), Phase::Sampling);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_input_returns_to_idle() {
        let mut h = Harness::new(&[0], config(30, 5));
        h.monitor.start().await.unwrap();
        settle(Duration::from_millis(100)).await;

        h.script.disconnected.store(true, Ordering::SeqCst);
        settle(Duration::from_millis(100)).await;

        assert!(!h.monitor.is_running());
        assert_eq!(h.monitor.phase(), Phase::Idle);
        assert!(h.statuses().contains(&Status::NoAudioAccess));
        h.monitor.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_change_applies_to_next_pause() {
        let mut h = Harness::new(&[45], config(30, 5));
        h.monitor.settings().set_cooldown_seconds(2).unwrap();
        h.monitor.start().await.unwrap();

        let monitor = &h.monitor;
        wait_until(|| monitor.phase() == Phase::Cooldown).await;
        assert!(h.statuses().contains(&Status::Paused { seconds: 2 }));
        assert!(h.clock.sleeps.lock().unwrap().contains(&Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_output_does_not_block_stop() {
        let mut h = Harness::new(&[45], config(30, 5));
        h.output.stalled.store(true, Ordering::SeqCst);
        h.monitor.start().await.unwrap();

        let output = h.output.clone();
        wait_until(|| output.attempts.load(Ordering::SeqCst) == 1).await;
        assert_eq!(h.monitor.phase(), Phase::Alerting);

        // other work on the runtime keeps running while playback hangs
        settle(Duration::from_secs(1)).await;
        h.monitor.stop();
        tokio::time::timeout(Duration::from_millis(100), h.monitor.join())
            .await
            .expect("session task should end on stop");

        assert_eq!(h.output.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(h.monitor.state().phase, Phase::Idle);
        assert_eq!(h.statuses().last(), Some(&Status::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_waits_for_every_session() {
        let mut h = Harness::new(&[45], config(30, 5));
        h.output.stalled.store(true, Ordering::SeqCst);
        h.monitor.start().await.unwrap();
        let output = h.output.clone();
        wait_until(|| output.attempts.load(Ordering::SeqCst) == 1).await;
        h.monitor.stop();

        // restart before the first task has been polled again
        h.output.stalled.store(false, Ordering::SeqCst);
        h.monitor.start().await.unwrap();
        assert_eq!(h.monitor.tasks.len(), 2);

        h.monitor.stop();
        h.monitor.join().await;
        assert!(h.monitor.tasks.is_empty());
        assert_eq!(h.monitor.phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_reports_phase() {
        let mut h = Harness::new(&[45], config(30, 5));
        assert_eq!(h.monitor.state().phase, Phase::Idle);

        h.monitor.start().await.unwrap();
        let monitor = &h.monitor;
        wait_until(|| monitor.phase() == Phase::Cooldown).await;
        let state = h.monitor.state();
        assert_eq!(state.phase, Phase::Cooldown);
        assert!(state.running);
    }

    #[test]
    fn test_status_text() {
        assert_eq!(Status::Monitoring.to_string(), "Monitoring active...");
        assert_eq!(
            Status::Triggered {
                sound: SoundKind::Seagull,
                volume_percent: 45
            }
            .to_string(),
            "Snore! Sound: Seagull (45%)"
        );
        assert_eq!(Status::Paused { seconds: 5 }.to_string(), "Pause 5 sec...");
        assert_eq!(Status::Stopped.to_string(), "Monitoring stopped");
        assert!(Status::NoAudioAccess.is_alert());
        assert!(!Status::Paused { seconds: 1 }.is_alert());
    }
}
