//! BeamKit CLI: load a job file, optimize the cut order, and stream the
//! resulting program to a GRBL controller (or print it for a dry run).

use anyhow::{bail, Context};
use beamkit::{
    encode, idle_travel, init_logging, optimize, EncoderConfig, LinkConfig, OptimizeLevel,
    OptimizerConfig, Path, Point, Segment, SerialLink, Session, SessionConfig, SessionEvent,
};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "beamkit", version, about = "Stream optimized laser jobs to GRBL controllers")]
struct Args {
    /// Job file: a JSON array of paths, each path an array of segments
    job: PathBuf,

    /// Serial port to stream to; omit to print the program to stdout
    #[arg(long)]
    port: Option<String>,

    /// Baud rate
    #[arg(long, default_value_t = 115200)]
    baud: u32,

    /// Optimization level: 0 (fast), 1 (medium), 2 (max)
    #[arg(long, default_value_t = 2)]
    level: u8,

    /// Cut feed rate in mm/min
    #[arg(long, default_value_t = 1000.0)]
    feed: f64,

    /// Laser power (S word)
    #[arg(long, default_value_t = 1000.0)]
    power: f64,

    /// Use dynamic laser power (M4) instead of constant (M3)
    #[arg(long)]
    dynamic_power: bool,

    /// Rapid back to the origin when the job is done
    #[arg(long)]
    return_home: bool,
}

fn load_job(path: &PathBuf) -> anyhow::Result<Vec<Path>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading job file {}", path.display()))?;
    let raw: Vec<Vec<Segment>> =
        serde_json::from_str(&text).context("job file is not a JSON array of segment arrays")?;

    raw.into_iter()
        .enumerate()
        .map(|(i, segments)| {
            Path::new(segments).with_context(|| format!("invalid path at index {}", i))
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    let args = Args::parse();

    let level = match args.level {
        0 => OptimizeLevel::Fast,
        1 => OptimizeLevel::Medium,
        2 => OptimizeLevel::Max,
        other => bail!("unknown optimization level {}", other),
    };

    let paths = load_job(&args.job)?;
    tracing::info!(paths = paths.len(), "job loaded");

    let start = Point::new(0.0, 0.0);
    let before = idle_travel(start, &paths, args.return_home);

    let optimizer = OptimizerConfig {
        level,
        include_return: args.return_home,
        ..Default::default()
    };
    let ordered = optimize(paths, start, &optimizer)?;

    let after = idle_travel(start, &ordered, args.return_home);
    tracing::info!("idle travel: {:.1} mm -> {:.1} mm", before, after);

    let encoder = EncoderConfig {
        cut_feed: args.feed,
        laser_power: args.power,
        dynamic_power: args.dynamic_power,
        return_home: args.return_home,
        ..Default::default()
    };
    let program = encode(&ordered, &encoder);

    let Some(port) = args.port else {
        for line in program.lines() {
            println!("{}", line.text);
        }
        return Ok(());
    };

    let link = SerialLink::open(&LinkConfig {
        port: port.clone(),
        baud_rate: args.baud,
        ..Default::default()
    })?;

    let mut session = Session::new(SessionConfig::default());
    session.connect(Box::new(link))?;
    let mut events = session.subscribe();

    session.load(program)?;
    session.start().await?;
    tracing::info!("streaming started on {}", port);

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(_) => break,
        };
        match &event {
            SessionEvent::Progress { acked, total } => {
                tracing::info!("progress: {}/{}", acked, total);
            }
            SessionEvent::Completed => {
                tracing::info!("job complete");
                break;
            }
            SessionEvent::Fault(reason) => {
                session.disconnect();
                bail!("streaming failed: {}", reason);
            }
            other => tracing::debug!("{}", other),
        }
    }

    session.disconnect();
    Ok(())
}
