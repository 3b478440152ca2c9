//! RTP Sender - L16 audio stream sender
//!
//! Reads raw 16-bit little-endian PCM from stdin or a file and sends it as
//! an RTP stream, one frame per ptime, optionally dialing DTMF digits.

use clap::Parser;
use rtp_cli::{format_stream_stats, init_logging, l16_codec, stream_info, Config};
use rtp_io::{Ticker, Timer, Timestamp};
use rtp_stream::{Direction, MediaStream, UdpTransport};
use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "rtp-sender")]
#[command(about = "RTP L16 audio sender", long_about = None)]
struct Args {
    /// Input source: raw PCM file path or '-' for stdin
    #[arg(short, long, default_value = "-")]
    input: String,

    /// Remote address (host:port)
    #[arg(short, long)]
    remote: Option<SocketAddr>,

    /// Local bind address
    #[arg(short, long)]
    local: Option<SocketAddr>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Frame duration in milliseconds
    #[arg(long)]
    ptime: Option<u32>,

    /// DTMF digits to dial once streaming starts
    #[arg(long)]
    dtmf: Option<String>,

    /// Delay before dialing, in milliseconds
    #[arg(long, default_value = "1000")]
    dtmf_delay_ms: u64,

    /// Statistics interval in seconds
    #[arg(long)]
    stats: Option<u64>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn open_input(input: &str) -> anyhow::Result<Box<dyn Read>> {
    if input == "-" {
        tracing::info!("Reading PCM from stdin");
        Ok(Box::new(io::stdin()))
    } else {
        tracing::info!("Reading PCM from {}", input);
        Ok(Box::new(BufReader::new(File::open(input)?)))
    }
}

/// Fill `buf` as far as the input allows, returning the bytes read
fn read_frame(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut config = Config::load(args.config.as_deref())?;
    if args.remote.is_some() {
        config.stream.remote = args.remote;
    }
    if let Some(local) = args.local {
        config.stream.local = local;
    }
    if let Some(ptime) = args.ptime {
        config.stream.ptime = ptime;
    }
    if let Some(stats) = args.stats {
        config.stream.stats_interval_secs = stats;
    }
    config.validate()?;

    let Some(remote) = config.stream.remote else {
        anyhow::bail!("A remote address is required");
    };

    let transport = UdpTransport::bind(config.stream.local, Some(remote))?;
    tracing::info!("Sending from {} to {}", transport.local_addr()?, remote);

    let info = stream_info(&config, "sender", Direction::Encoding);
    let stream = MediaStream::create(
        info,
        Box::new(l16_codec(&config.stream)),
        Box::new(transport),
    )?;
    stream.start();

    let mut reader = open_input(&args.input)?;
    let samples = config.stream.samples_per_frame();
    let mut raw = vec![0u8; samples * 2];
    let mut pcm = vec![0i16; samples];

    let start = Timestamp::now();
    let mut ticker = Ticker::new(config.stream.frame_period());
    let mut stats_timer = Timer::new(config.stream.stats_interval());
    let mut dtmf = args.dtmf.clone();
    let dtmf_delay = Duration::from_millis(args.dtmf_delay_ms);

    loop {
        let n = read_frame(reader.as_mut(), &mut raw)?;
        if n == 0 {
            tracing::info!("End of input reached");
            break;
        }
        raw[n..].fill(0);

        for (sample, bytes) in pcm.iter_mut().zip(raw.chunks_exact(2)) {
            *sample = i16::from_le_bytes([bytes[0], bytes[1]]);
        }

        if start.elapsed() >= dtmf_delay {
            if let Some(digits) = dtmf.take() {
                stream.dial_dtmf(&digits)?;
                tracing::info!("Dialing {}", digits);
            }
        }

        stream.put_frame(&pcm)?;

        if stats_timer.try_fire() {
            tracing::info!("{}", format_stream_stats(&stream.stats(), start.elapsed()));
        }

        let missed = ticker.wait();
        if missed > 0 {
            tracing::debug!("Sender fell behind by {} frame(s)", missed);
        }
    }

    tracing::info!("{}", format_stream_stats(&stream.stats(), start.elapsed()));
    Ok(())
}
