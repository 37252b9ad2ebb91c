mod audio;
mod clock;
mod config;
mod error;
mod escalator;
mod monitor;
mod protocol;
mod sampler;
mod synth;
mod ui_bridge;

use audio::{AlsaInput, AlsaOutput, AnalyserConfig, CaptureConfig, PlaybackConfig};
use clock::FrameClock;
use config::{Config, Settings};
use monitor::Monitor;
use protocol::{UiCommand, UiMessage};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use ui_bridge::UiBridge;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();

    // 加载编译时配置
    let config = Config::new().map_err(anyhow::Error::msg)?;
    let settings = Arc::new(Settings::new(config.monitor_config()));

    let input = Arc::new(AlsaInput::new(CaptureConfig {
        device: config.capture_device.to_string(),
        sample_rate: config.sample_rate,
        channels: 1,
        analyser: AnalyserConfig {
            fft_size: config.fft_size,
            smoothing: config.smoothing,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
        },
    }));
    let output = Arc::new(AlsaOutput::new(PlaybackConfig {
        device: config.playback_device.to_string(),
        sample_rate: config.playback_sample_rate,
        ..Default::default()
    }));
    let clock = Arc::new(FrameClock::new(config.frame_rate_hz));

    // 显示事件通道：monitor -> UI
    let (tx_display, mut rx_display) = mpsc::unbounded_channel();
    // 命令通道：UI -> monitor
    let (tx_ui_cmd, mut rx_ui_cmd) = mpsc::channel::<UiCommand>(100);

    let ui_bridge = Arc::new(UiBridge::new(&config, tx_ui_cmd).await?);
    let ui_bridge_clone = ui_bridge.clone();
    tokio::spawn(async move {
        if let Err(e) = ui_bridge_clone.run().await {
            log::error!("UiBridge error: {}", e);
        }
    });

    log::info!(
        "{} {} ready, UI on port {}, sampling every {:?}",
        env!("APP_NAME"),
        env!("APP_VERSION"),
        config.ui_local_port,
        clock.frame_period()
    );
    let mut monitor = Monitor::new(
        input,
        output,
        clock,
        settings.clone(),
        tx_display,
        StdRng::from_entropy(),
    );

    if let Err(e) = ui_bridge.send(&UiMessage::config(&settings.snapshot())).await {
        log::warn!("Failed to send config to UI: {}", e);
    }

    if config.autostart {
        if let Err(e) = monitor.start().await {
            log::error!("Autostart failed: {}", e);
        }
    }

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                log::info!("Received Ctrl+C, shutting down...");
                break;
            }

            Some(command) = rx_ui_cmd.recv() => {
                handle_command(&mut monitor, &ui_bridge, command).await;
            }

            Some(event) = rx_display.recv() => {
                if let Err(e) = ui_bridge.send(&UiMessage::from(event)).await {
                    log::debug!("Failed to send to UI: {}", e);
                }
            }
        }
    }

    monitor.stop();
    monitor.join().await;
    Ok(())
}

async fn handle_command(monitor: &mut Monitor, ui_bridge: &UiBridge, command: UiCommand) {
    log::debug!("UI command: {:?}", command);
    let settings = monitor.settings().clone();
    let result = match command {
        UiCommand::Start => {
            // 失败原因已经通过状态栏显示
            if let Err(e) = monitor.start().await {
                log::warn!("Start rejected: {}", e);
            }
            Ok(())
        }
        UiCommand::Stop => {
            monitor.stop();
            Ok(())
        }
        UiCommand::SetThreshold { value } => settings.set_threshold_percent(value),
        UiCommand::SetCooldown { value } => settings.set_cooldown_seconds(value),
        UiCommand::SetVolume { value } => settings.set_base_volume(value as f32 / 100.0),
        UiCommand::GetConfig => Ok(()),
        UiCommand::GetState => {
            let reply = UiMessage::state(&monitor.state());
            if let Err(e) = ui_bridge.send(&reply).await {
                log::debug!("Failed to send to UI: {}", e);
            }
            return;
        }
    };

    let reply = match result {
        Ok(()) => UiMessage::config(&settings.snapshot()),
        Err(e) => UiMessage::Error {
            text: e.to_string(),
        },
    };
    if let Err(e) = ui_bridge.send(&reply).await {
        log::debug!("Failed to send to UI: {}", e);
    }
}
