//! RTP Receiver - L16 audio stream receiver
//!
//! Receives an L16 RTP stream, plays it out through the jitter buffer at
//! ptime cadence and writes raw 16-bit little-endian PCM to stdout or a
//! file. Periods without audio are written as silence.

use clap::Parser;
use rtp_cli::{format_stream_stats, init_logging, l16_codec, stream_info, Config};
use rtp_io::{Ticker, Timer, Timestamp};
use rtp_stream::{Direction, MediaStream, PortFrameType, UdpTransport};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "rtp-receiver")]
#[command(about = "RTP L16 audio receiver", long_about = None)]
struct Args {
    /// Output file (use '-' for stdout)
    #[arg(short, long, default_value = "-")]
    output: String,

    /// Listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Frame duration in milliseconds
    #[arg(long)]
    ptime: Option<u32>,

    /// Stop after this many seconds
    #[arg(short, long)]
    duration: Option<u64>,

    /// Statistics interval in seconds
    #[arg(long)]
    stats: Option<u64>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn open_output(output: &str) -> anyhow::Result<Box<dyn Write>> {
    if output == "-" {
        Ok(Box::new(BufWriter::new(io::stdout())))
    } else {
        tracing::info!("Writing PCM to {}", output);
        Ok(Box::new(BufWriter::new(File::create(output)?)))
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.stream.local = listen;
    }
    if let Some(ptime) = args.ptime {
        config.stream.ptime = ptime;
    }
    if let Some(stats) = args.stats {
        config.stream.stats_interval_secs = stats;
    }
    config.validate()?;

    let transport = UdpTransport::bind(config.stream.local, config.stream.remote)?;
    tracing::info!("Listening on: {}", transport.local_addr()?);

    let info = stream_info(&config, "receiver", Direction::Decoding);
    let stream = MediaStream::create(
        info,
        Box::new(l16_codec(&config.stream)),
        Box::new(transport),
    )?;
    stream.start();

    let mut writer = open_output(&args.output)?;
    let samples = config.stream.samples_per_frame();
    let mut pcm = vec![0i16; samples];
    let mut raw = Vec::with_capacity(samples * 2);

    let start = Timestamp::now();
    let stop_after = args.duration.map(Duration::from_secs);
    let mut ticker = Ticker::new(config.stream.frame_period());
    let mut stats_timer = Timer::new(config.stream.stats_interval());

    while stop_after.map_or(true, |limit| start.elapsed() < limit) {
        let frame = stream.get_frame(&mut pcm);
        let played = match frame.frame_type {
            PortFrameType::Audio => frame.samples,
            PortFrameType::None => 0,
        };
        pcm[played..].fill(0);

        raw.clear();
        for sample in &pcm {
            raw.extend_from_slice(&sample.to_le_bytes());
        }
        writer.write_all(&raw)?;

        let digits = stream.get_dtmf();
        if !digits.is_empty() {
            tracing::info!("Received DTMF: {}", digits);
        }

        if stats_timer.try_fire() {
            writer.flush()?;
            tracing::info!("{}", format_stream_stats(&stream.stats(), start.elapsed()));
        }

        ticker.wait();
    }

    writer.flush()?;
    tracing::info!("{}", format_stream_stats(&stream.stats(), start.elapsed()));
    Ok(())
}
