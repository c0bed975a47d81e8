//! breathpace - breathing pacer CLI
//!
//! Prints session timelines, exports sessions to WAV and runs live sessions.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use breathpace_core::assets::{AssetConfig, EXHALE_SAMPLE_PATH};
use breathpace_core::clock::{ClockEvent, POLL_INTERVAL_SECONDS, RunState};
use breathpace_core::dsp::engine::EngineConfig;
use breathpace_core::dsp::renderer::RenderStage;
use breathpace_core::export::export_session;
use breathpace_core::live::{LiveSession, ManualTimebase, MonotonicTimebase, Timebase};
use breathpace_core::output::{AudioSink, NullSink};
use breathpace_core::settings::SessionSettings;
use breathpace_core::timeline::build_timeline;

#[derive(Parser)]
#[command(name = "breathpace")]
#[command(about = "Paced breathing sessions with a generated soundscape")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the phase timeline as JSON
    Timeline {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Render the session to a WAV file
    Export {
        #[command(flatten)]
        session: SessionArgs,

        #[command(flatten)]
        sample: SampleArgs,

        /// Output directory; the file name follows the rhythm
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Output sample rate
        #[arg(long, default_value_t = 44100)]
        sample_rate: u32,
    },

    /// Run a live session
    Play {
        #[command(flatten)]
        session: SessionArgs,

        #[command(flatten)]
        sample: SampleArgs,

        /// Run on a simulated clock with no audio device, as fast as possible
        #[arg(long)]
        headless: bool,
    },
}

#[derive(Args)]
struct SessionArgs {
    /// Read settings from a JSON file instead of the flags below
    #[arg(long)]
    settings: Option<PathBuf>,

    #[arg(long, default_value_t = 4)]
    inhale: u32,

    #[arg(long, default_value_t = 0)]
    hold1: u32,

    #[arg(long, default_value_t = 6)]
    exhale: u32,

    #[arg(long, default_value_t = 0)]
    hold2: u32,

    /// Session length in minutes
    #[arg(short, long, default_value_t = 10)]
    minutes: u32,

    /// Volume, 0 to 100
    #[arg(long, default_value_t = 80)]
    volume: u32,

    #[arg(long)]
    mute: bool,
}

impl SessionArgs {
    fn load(&self) -> Result<SessionSettings> {
        let settings = match &self.settings {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                SessionSettings::from_json(&json)?
            }
            None => SessionSettings {
                inhale_seconds: self.inhale,
                hold1_seconds: self.hold1,
                exhale_seconds: self.exhale,
                hold2_seconds: self.hold2,
                total_minutes: self.minutes,
                volume: self.volume,
                mute: self.mute,
            },
        };
        settings.validate().context("invalid session settings")?;
        Ok(settings)
    }
}

#[derive(Args)]
struct SampleArgs {
    /// Exhale recording
    #[arg(long, default_value = EXHALE_SAMPLE_PATH)]
    sample: PathBuf,

    /// Base URL the sample path is resolved against when the local file is missing
    #[arg(long)]
    base_url: Option<String>,
}

impl SampleArgs {
    fn config(&self) -> AssetConfig {
        AssetConfig {
            sample_path: self.sample.clone(),
            embedded_data_url: None,
            base_url: self.base_url.clone(),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Timeline { session } => {
            let timeline = build_timeline(&session.load()?)?;
            println!("{}", serde_json::to_string_pretty(&timeline)?);
            Ok(())
        }
        Commands::Export {
            session,
            sample,
            output,
            sample_rate,
        } => export(&session.load()?, &sample.config(), &output, sample_rate),
        Commands::Play {
            session,
            sample,
            headless,
        } => play(session.load()?, sample.config(), headless),
    }
}

fn export(
    settings: &SessionSettings,
    assets: &AssetConfig,
    output: &Path,
    sample_rate: u32,
) -> Result<()> {
    let engine = EngineConfig {
        sample_rate,
        ..EngineConfig::default()
    };
    let mut last: Option<RenderStage> = None;
    let exported = export_session(settings, assets, engine, |progress| {
        if last.is_some_and(|stage| stage != progress.stage) {
            eprintln!();
        }
        last = Some(progress.stage);
        eprint!("\r{:>3}% {}", progress.percent, progress.stage);
        let _ = std::io::stderr().flush();
    })
    .context("export failed")?;
    eprintln!();

    std::fs::create_dir_all(output).with_context(|| format!("creating {}", output.display()))?;
    let path = exported.save_in(output)?;
    info!(path = %path.display(), seconds = exported.duration_seconds, "session exported");
    println!("{}", path.display());
    Ok(())
}

fn play(settings: SessionSettings, assets: AssetConfig, headless: bool) -> Result<()> {
    if headless {
        let sink = NullSink::new(44100, 2);
        let session = LiveSession::new(settings, assets, EngineConfig::default(), sink, ManualTimebase::default());
        return drive(session, |s| {
            s.timebase_mut().advance(POLL_INTERVAL_SECONDS);
        });
    }

    #[cfg(feature = "device")]
    {
        let sink = breathpace_core::output::DeviceSink::open().context("opening audio output")?;
        let session =
            LiveSession::new(settings, assets, EngineConfig::default(), sink, MonotonicTimebase::new());
        drive(session, |_| std::thread::sleep(Duration::from_secs_f64(POLL_INTERVAL_SECONDS)))
    }

    #[cfg(not(feature = "device"))]
    {
        // No device support compiled in: keep wall-clock pacing, discard audio.
        let sink = NullSink::new(44100, 2);
        let session =
            LiveSession::new(settings, assets, EngineConfig::default(), sink, MonotonicTimebase::new());
        drive(session, |_| std::thread::sleep(Duration::from_secs_f64(POLL_INTERVAL_SECONDS)))
    }
}

fn drive<S: AudioSink, T: Timebase>(
    mut session: LiveSession<S, T>,
    mut wait: impl FnMut(&mut LiveSession<S, T>),
) -> Result<()> {
    let events = session.start().context("starting session")?;
    report(&events);
    let mut shown = String::new();
    while session.state() == RunState::Running {
        wait(&mut session);
        let events = session.tick()?;
        report(&events);

        let readout = session.readout();
        let line = format!(
            "{:<20} {}  total {}",
            readout.phase_label.unwrap_or(""),
            readout.phase_remaining(),
            readout.total_remaining()
        );
        if line != shown {
            eprint!("\r{line}");
            let _ = std::io::stderr().flush();
            shown = line;
        }
    }
    eprintln!();

    // Let the last sounds ring out before tearing down.
    let tail = session.timebase().now() + 2.0;
    while session.timebase().now() < tail {
        wait(&mut session);
        session.tick()?;
    }
    session.stop();
    Ok(())
}

fn report(events: &[ClockEvent]) {
    for event in events {
        match event {
            ClockEvent::PhaseStarted { phase, .. } => {
                info!(phase = phase.label, seconds = phase.duration_seconds, "phase")
            }
            ClockEvent::StopScheduled { .. } => info!("time is up, finishing this cycle"),
            ClockEvent::Finished { .. } => info!("session complete"),
        }
    }
}
