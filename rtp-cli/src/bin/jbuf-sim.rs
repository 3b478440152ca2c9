//! Jitter buffer simulator
//!
//! Feeds one jitter buffer from a simulated jittery, lossy network and
//! prints how playout went.

use clap::Parser;
use rtp_cli::{display_sim_report, init_logging, Config, JitterPolicy, Simulator};
use rtp_jbuf::JitterBuffer;
use rtp_stream::JitterMode;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "jbuf-sim")]
#[command(about = "Jitter buffer network simulator", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Simulated duration in seconds
    #[arg(short, long)]
    duration: Option<u64>,

    /// Random seed
    #[arg(short, long)]
    seed: Option<u64>,

    /// Packet loss in percent
    #[arg(long)]
    loss: Option<f64>,

    /// Maximum random extra delay in milliseconds
    #[arg(long)]
    jitter_ms: Option<u32>,

    /// Reordering probability in percent
    #[arg(long)]
    reorder: Option<f64>,

    /// Prefetch policy (default, fixed, adaptive)
    #[arg(long)]
    mode: Option<String>,

    /// Initial or fixed prefetch in frames
    #[arg(long)]
    prefetch: Option<usize>,

    /// Jitter buffer capacity in frames
    #[arg(long)]
    max_count: Option<usize>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(duration) = args.duration {
        config.sim.duration_secs = duration;
    }
    if let Some(seed) = args.seed {
        config.sim.seed = seed;
    }
    if let Some(loss) = args.loss {
        config.sim.loss_percent = loss;
    }
    if let Some(jitter_ms) = args.jitter_ms {
        config.sim.jitter_ms = jitter_ms;
    }
    if let Some(reorder) = args.reorder {
        config.sim.reorder_percent = reorder;
    }
    if let Some(mode) = args.mode.as_deref() {
        config.jitter.mode = match mode {
            "default" => JitterPolicy::Default,
            "fixed" => JitterPolicy::Fixed,
            "adaptive" => JitterPolicy::Adaptive,
            _ => anyhow::bail!("Invalid jitter mode: {}", mode),
        };
    }
    if let Some(prefetch) = args.prefetch {
        config.jitter.prefetch = prefetch;
    }
    if args.max_count.is_some() {
        config.jitter.max_count = args.max_count;
    }
    config.validate()?;

    let capacity = config.jitter.capacity(config.sim.ptime);
    let jb = JitterBuffer::new("sim", config.sim.frame_size, config.sim.ptime, capacity)?;
    match config.jitter.mode() {
        JitterMode::Default => {}
        JitterMode::Fixed(prefetch) => jb.set_fixed(prefetch)?,
        JitterMode::Adaptive { prefetch, min, max } => jb.set_adaptive(prefetch, min, max)?,
    }

    tracing::info!(
        "Simulating {}s at {}ms ptime: delay {}+{}ms, loss {}%, reorder {}%, seed {}",
        config.sim.duration_secs,
        config.sim.ptime,
        config.sim.base_delay_ms,
        config.sim.jitter_ms,
        config.sim.loss_percent,
        config.sim.reorder_percent,
        config.sim.seed
    );

    let report = Simulator::new(config.sim.clone()).run(&jb);
    display_sim_report(&report);

    Ok(())
}
