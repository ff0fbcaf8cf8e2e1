#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;

use abwave::app::AbWaveApp;
use abwave::audio::AudioEngine;
use abwave::config::PlayerConfig;
use abwave::session::{Session, TickOutcome};

#[derive(Parser, Debug)]
#[command(name = "abwave", version, about = "A-B loop waveform player")]
struct Cli {
    /// Audio file to open
    file: Option<PathBuf>,
    /// Player config (TOML). Falls back to $ABWAVE_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Play in the terminal without opening a window
    #[arg(long)]
    headless: bool,
    #[arg(long, value_name = "SECS")]
    loop_start: Option<f64>,
    #[arg(long, value_name = "SECS")]
    loop_end: Option<f64>,
    #[arg(long, value_name = "R")]
    rate: Option<f32>,
    #[arg(long, value_name = "V")]
    volume: Option<f32>,
}

fn build_session(cli: &Cli, config: &PlayerConfig) -> Result<Session> {
    let engine = AudioEngine::new().context("open audio output")?;
    let mut session = Session::new(engine, config);
    if let Some(rate) = cli.rate {
        session.set_playback_rate(rate);
    }
    if let Some(volume) = cli.volume {
        session.set_volume(volume);
    }
    Ok(session)
}

fn apply_loop(session: &mut Session, start: Option<f64>, end: Option<f64>) {
    if let Some(t) = start {
        session.set_clicked_time(t);
        session.commit_start();
    }
    if let Some(t) = end {
        session.set_clicked_time(t);
        session.commit_end();
    }
}

fn run_headless(cli: &Cli, config: &PlayerConfig) -> Result<()> {
    let Some(path) = cli.file.as_ref() else {
        bail!("--headless needs an audio file");
    };
    let mut session = build_session(cli, config)?;
    session.load_file_blocking(path)?;
    apply_loop(&mut session, cli.loop_start, cli.loop_end);
    if let Some(start) = session.markers().start() {
        session.seek(start);
    }
    let markers = *session.markers();
    log::info!(
        "headless_play path=\"{}\" duration={:.3} loop={:?}",
        path.display(),
        session.duration(),
        markers.region()
    );
    session.play();
    loop {
        let now = Instant::now();
        match session.update(now) {
            TickOutcome::Finished => break,
            TickOutcome::Wrapped { from, to } => {
                log::info!("loop from={from:.3} to={to:.3}");
            }
            _ => {}
        }
        let wait = session
            .next_wakeup(now)
            .unwrap_or(Duration::from_millis(10));
        std::thread::sleep(wait.max(Duration::from_millis(1)));
    }
    log::info!("headless_done");
    Ok(())
}

fn run_gui(cli: Cli, config: PlayerConfig) -> Result<()> {
    let mut session = build_session(&cli, &config)?;
    let mut deferred = cli.file.clone();
    // Loop markers need a duration; load synchronously so they can apply.
    if cli.loop_start.is_some() || cli.loop_end.is_some() {
        if let Some(path) = deferred.take() {
            if session.load_file_blocking(&path).is_ok() {
                apply_loop(&mut session, cli.loop_start, cli.loop_end);
            }
        }
    }

    let viewport = egui::ViewportBuilder::default()
        .with_min_inner_size([640.0, 320.0])
        .with_inner_size([1080.0, 420.0])
        .with_drag_and_drop(true);
    let native_options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };
    eframe::run_native(
        "abwave",
        native_options,
        Box::new(move |_cc| Ok(Box::new(AbWaveApp::new(session, deferred)))),
    )
    .map_err(|e| anyhow::anyhow!("gui: {e}"))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let config = PlayerConfig::resolve(cli.config.as_deref())?;
    log::debug!("config {config:?}");
    if cli.headless {
        run_headless(&cli, &config)
    } else {
        run_gui(cli, config)
    }
}
