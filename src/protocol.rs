use serde::{Deserialize, Serialize};

use crate::config::MonitorConfig;
use crate::monitor::{DisplayEvent, MonitorState, Phase};

/// The trigger counter shows at most this many bells.
const MAX_BELLS: usize = 10;

/// Commands from the UI process.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiCommand {
    Start,
    Stop,
    SetThreshold { value: u32 },
    SetCooldown { value: u32 },
    /// Base volume in percent
    SetVolume { value: u32 },
    GetConfig,
    GetState,
}

/// Messages pushed to the UI process.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiMessage {
    Level { value: u8 },
    Status { text: String, alert: bool },
    Triggers { count: u32, bells: String },
    Config { threshold: u8, cooldown: u32, volume: u8 },
    /// Volume of the next alert in percent
    State { phase: Phase, running: bool, volume: u8, triggers: u32 },
    Error { text: String },
}

impl UiMessage {
    pub fn config(config: &MonitorConfig) -> Self {
        UiMessage::Config {
            threshold: config.threshold_percent,
            cooldown: config.cooldown_seconds,
            volume: (config.base_volume * 100.0).round() as u8,
        }
    }

    pub fn state(state: &MonitorState) -> Self {
        UiMessage::State {
            phase: state.phase,
            running: state.running,
            volume: (state.current_volume * 100.0).round() as u8,
            triggers: state.trigger_count,
        }
    }
}

impl From<DisplayEvent> for UiMessage {
    fn from(event: DisplayEvent) -> Self {
        match event {
            DisplayEvent::Level(value) => UiMessage::Level { value },
            DisplayEvent::Status(status) => UiMessage::Status {
                alert: status.is_alert(),
                text: status.to_string(),
            },
            DisplayEvent::Triggers(count) => UiMessage::Triggers {
                count,
                bells: "🔔".repeat((count as usize).min(MAX_BELLS)),
            },
        }
    }
}
