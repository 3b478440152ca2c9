//! Media stream engine
//!
//! A [`MediaStream`] joins a codec, a transport and a jitter buffer into
//! one bidirectional RTP stream. Three threads touch it:
//!
//! - the receive thread owned by the stream, which validates incoming
//!   packets and puts their payloads into the jitter buffer;
//! - the audio playout side, calling [`MediaStream::get_frame`] once per
//!   frame period;
//! - the audio capture side, calling [`MediaStream::put_frame`] once per
//!   frame period.
//!
//! The jitter buffer carries its own lock; the encoder and decoder state
//! each sit behind a separate mutex so capture and receive never contend.

use crate::codec::{Codec, CodecError, CodecParam};
use crate::dtmf::{DtmfReceiver, DtmfSender};
use crate::stats::StreamStats;
use crate::transport::Transport;
use bytes::{BufMut, BytesMut};
use parking_lot::{Mutex, RwLock};
use rtp_jbuf::{FrameType, JbufError, JitterBuffer};
use rtp_protocol::dtmf::DEFAULT_DTMF_PT;
use rtp_protocol::packet::{PacketError, RtpPacket, MAX_MTU};
use rtp_protocol::{RtpSession, SeqStatus};
use std::io::{self, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Longest frame duration a stream accepts
pub const MAX_FRAME_DURATION_MS: u32 = 200;

/// Default jitter buffer span
pub const MAX_BUFFER_SIZE_MS: u32 = 2000;

/// How long the receive thread waits before rechecking for shutdown
pub const RX_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Stream errors
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Stream is closed")]
    Closed,

    #[error("Invalid stream configuration: {0}")]
    InvalidConfig(String),

    #[error("Jitter buffer error: {0}")]
    Jitter(#[from] JbufError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid DTMF digit: {0:?}")]
    InvalidDtmfDigit(char),

    #[error("DTMF queue is full")]
    DtmfQueueFull,

    #[error("DTMF is not enabled on this stream")]
    DtmfDisabled,
}

/// Media direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encoding,
    Decoding,
    EncodingDecoding,
}

impl Direction {
    /// Whether this direction includes sending
    pub fn encodes(self) -> bool {
        matches!(self, Direction::Encoding | Direction::EncodingDecoding)
    }

    /// Whether this direction includes receiving
    pub fn decodes(self) -> bool {
        matches!(self, Direction::Decoding | Direction::EncodingDecoding)
    }
}

/// Jitter buffer prefetch policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JitterMode {
    /// Adaptive with the buffer's construction defaults
    #[default]
    Default,
    /// Fixed prefetch, in frames
    Fixed(usize),
    /// Adaptive within bounds, in frames
    Adaptive { prefetch: usize, min: usize, max: usize },
}

/// Stream configuration
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// Name used in log records
    pub name: String,
    pub direction: Direction,
    /// Payload type of audio packets
    pub payload_type: u8,
    /// Payload type of telephone events, `None` disables DTMF
    pub dtmf_payload_type: Option<u8>,
    /// Local SSRC
    pub ssrc: u32,
    /// First outgoing sequence number
    pub initial_seq: u16,
    /// First outgoing timestamp
    pub initial_ts: u32,
    /// Jitter buffer capacity in frames, defaults to two seconds worth
    pub jb_max_count: Option<usize>,
    pub jitter: JitterMode,
}

impl StreamInfo {
    /// Bidirectional stream with random SSRC, sequence and timestamp
    pub fn new(name: impl Into<String>, payload_type: u8) -> Self {
        StreamInfo {
            name: name.into(),
            direction: Direction::EncodingDecoding,
            payload_type,
            dtmf_payload_type: Some(DEFAULT_DTMF_PT),
            ssrc: rand::random(),
            initial_seq: rand::random(),
            initial_ts: rand::random(),
            jb_max_count: None,
            jitter: JitterMode::Default,
        }
    }
}

/// Kind of frame handed to the audio side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortFrameType {
    /// No audio: the caller should conceal or play silence
    None,
    /// Decoded audio
    Audio,
}

/// Result of [`MediaStream::get_frame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortFrame {
    pub frame_type: PortFrameType,
    /// Samples written to the output
    pub samples: usize,
    /// What the jitter buffer returned
    pub jb_frame: FrameType,
}

impl PortFrame {
    fn none(jb_frame: FrameType) -> Self {
        PortFrame {
            frame_type: PortFrameType::None,
            samples: 0,
            jb_frame,
        }
    }
}

struct EncoderChannel {
    session: RtpSession,
    dtmf: DtmfSender,
    payload: Vec<u8>,
    packet: BytesMut,
}

struct DecoderChannel {
    session: RtpSession,
    dtmf: DtmfReceiver,
    /// Scratch for one encoded frame taken from the jitter buffer
    frame: Vec<u8>,
}

struct StreamShared {
    info: StreamInfo,
    param: CodecParam,
    jb: JitterBuffer,
    codec: Mutex<Box<dyn Codec>>,
    transport: Box<dyn Transport>,
    enc: Mutex<EncoderChannel>,
    dec: Mutex<DecoderChannel>,
    enc_paused: AtomicBool,
    dec_paused: AtomicBool,
    quit: AtomicBool,
    stats: RwLock<StreamStats>,
}

/// Bidirectional RTP media stream
pub struct MediaStream {
    shared: Arc<StreamShared>,
    rx_thread: Option<JoinHandle<()>>,
}

impl MediaStream {
    /// Create a stream
    ///
    /// Both channels start paused; call [`start`](Self::start) to begin
    /// exchanging media. The receive thread is spawned right away when the
    /// direction includes decoding.
    pub fn create(
        info: StreamInfo,
        codec: Box<dyn Codec>,
        transport: Box<dyn Transport>,
    ) -> Result<MediaStream, StreamError> {
        let param = codec.param().clone();
        if param.ptime == 0 || param.ptime > MAX_FRAME_DURATION_MS {
            return Err(StreamError::InvalidConfig(format!(
                "ptime {}ms outside 1..={}ms",
                param.ptime, MAX_FRAME_DURATION_MS
            )));
        }
        let frame_size = param.frame_size();
        if frame_size == 0 || frame_size > MAX_MTU {
            return Err(StreamError::InvalidConfig(format!(
                "encoded frame size {} outside 1..={}",
                frame_size, MAX_MTU
            )));
        }

        let max_count = info
            .jb_max_count
            .unwrap_or((MAX_BUFFER_SIZE_MS / param.ptime) as usize);
        let jb = JitterBuffer::new(format!("{}-jb", info.name), frame_size, param.ptime, max_count)?;
        match info.jitter {
            JitterMode::Default => {}
            JitterMode::Fixed(prefetch) => jb.set_fixed(prefetch)?,
            JitterMode::Adaptive { prefetch, min, max } => jb.set_adaptive(prefetch, min, max)?,
        }

        let enc = EncoderChannel {
            session: RtpSession::new(info.payload_type, info.ssrc, info.initial_seq, info.initial_ts),
            dtmf: DtmfSender::new(),
            payload: Vec::with_capacity(frame_size),
            packet: BytesMut::with_capacity(MAX_MTU),
        };
        let dec = DecoderChannel {
            session: RtpSession::new(info.payload_type, info.ssrc, 0, 0),
            dtmf: DtmfReceiver::new(),
            frame: vec![0u8; frame_size],
        };

        let decodes = info.direction.decodes();
        let shared = Arc::new(StreamShared {
            info,
            param,
            jb,
            codec: Mutex::new(codec),
            transport,
            enc: Mutex::new(enc),
            dec: Mutex::new(dec),
            enc_paused: AtomicBool::new(true),
            dec_paused: AtomicBool::new(true),
            quit: AtomicBool::new(false),
            stats: RwLock::new(StreamStats::default()),
        });

        let rx_thread = if decodes {
            let rx_shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("{}-rx", shared.info.name))
                .spawn(move || rx_shared.receive_loop())?;
            Some(handle)
        } else {
            None
        };

        debug!(
            "{}: stream created, pt={} frame_size={} ptime={}ms jb_capacity={}",
            shared.info.name, shared.info.payload_type, frame_size, shared.param.ptime, max_count
        );

        Ok(MediaStream { shared, rx_thread })
    }

    /// Resume the channels of the configured direction
    pub fn start(&self) {
        info!("{}: stream started", self.shared.info.name);
        self.resume(self.shared.info.direction);
    }

    /// Pause one or both channels
    pub fn pause(&self, dir: Direction) {
        if dir.encodes() {
            self.shared.enc_paused.store(true, Ordering::Release);
        }
        if dir.decodes() {
            self.shared.dec_paused.store(true, Ordering::Release);
        }
        info!("{}: {:?} paused", self.shared.info.name, dir);
    }

    /// Resume one or both channels
    pub fn resume(&self, dir: Direction) {
        if dir.encodes() {
            self.shared.enc_paused.store(false, Ordering::Release);
        }
        if dir.decodes() {
            self.shared.dec_paused.store(false, Ordering::Release);
        }
        info!("{}: {:?} resumed", self.shared.info.name, dir);
    }

    /// Pull one frame of audio for playout
    ///
    /// Writes decoded samples to `pcm_out`. When the jitter buffer has no
    /// frame for this period the result has type [`PortFrameType::None`]
    /// and `pcm_out` is left untouched.
    pub fn get_frame(&self, pcm_out: &mut [i16]) -> PortFrame {
        let shared = &*self.shared;
        if shared.quit.load(Ordering::Acquire) {
            return PortFrame::none(FrameType::ZeroEmpty);
        }

        let mut dec = shared.dec.lock();
        let got = shared.jb.get_frame(&mut dec.frame);
        if !got.frame_type.is_normal() {
            return PortFrame::none(got.frame_type);
        }

        match shared.codec.lock().decode(&dec.frame[..got.len], pcm_out) {
            Ok(samples) => PortFrame {
                frame_type: PortFrameType::Audio,
                samples,
                jb_frame: got.frame_type,
            },
            Err(e) => {
                debug!("{}: decode failed: {}", shared.info.name, e);
                PortFrame::none(got.frame_type)
            }
        }
    }

    /// Encode and send one frame of captured audio
    ///
    /// While DTMF digits are queued, telephone events are sent in place of
    /// the audio. Does nothing while the encoder is paused.
    pub fn put_frame(&self, pcm: &[i16]) -> Result<(), StreamError> {
        let shared = &*self.shared;
        if shared.quit.load(Ordering::Acquire) {
            return Err(StreamError::Closed);
        }
        if shared.enc_paused.load(Ordering::Acquire) {
            return Ok(());
        }

        let ts_len = pcm.len() as u32 / shared.param.channel_count.max(1) as u32;
        let mut guard = shared.enc.lock();
        let enc = &mut *guard;
        enc.payload.clear();

        let mut digit_done = false;
        let header = match (enc.dtmf.is_active(), shared.info.dtmf_payload_type) {
            (true, Some(dtmf_pt)) => {
                let mut header = enc.session.encode(dtmf_pt, false, ts_len);
                if let Some(packet) = enc.dtmf.next_packet(header.timestamp, ts_len) {
                    let mut event = BytesMut::with_capacity(4);
                    packet.event.to_bytes(&mut event);
                    enc.payload.extend_from_slice(&event);
                    header.timestamp = packet.timestamp;
                    header.marker = packet.marker;
                    digit_done = packet.event.end;
                }
                header
            }
            _ => {
                shared.codec.lock().encode(pcm, &mut enc.payload)?;
                enc.session.encode(shared.info.payload_type, false, ts_len)
            }
        };

        enc.packet.clear();
        header.to_bytes(&mut enc.packet)?;
        enc.packet.put_slice(&enc.payload);
        shared.transport.send(&enc.packet)?;

        let mut stats = shared.stats.write();
        stats.tx.packets += 1;
        stats.tx.bytes += enc.packet.len() as u64;
        if digit_done {
            stats.dtmf_sent += 1;
        }
        trace!(
            "{}: sent seq={} ts={} len={}",
            shared.info.name,
            header.seq,
            header.timestamp,
            enc.packet.len()
        );

        Ok(())
    }

    /// Queue DTMF digits for transmission
    pub fn dial_dtmf(&self, digits: &str) -> Result<(), StreamError> {
        if self.shared.info.dtmf_payload_type.is_none() {
            return Err(StreamError::DtmfDisabled);
        }
        self.shared.enc.lock().dtmf.queue_digits(digits)?;
        debug!("{}: dialing {:?}", self.shared.info.name, digits);
        Ok(())
    }

    /// Take the DTMF digits received so far
    pub fn get_dtmf(&self) -> String {
        self.shared.dec.lock().dtmf.drain()
    }

    /// Statistics snapshot
    pub fn stats(&self) -> StreamStats {
        let mut stats = self.shared.stats.read().clone();
        stats.jitter = self.shared.jb.state();
        stats
    }

    /// Stream configuration
    pub fn info(&self) -> &StreamInfo {
        &self.shared.info
    }

    /// Codec parameters
    pub fn codec_param(&self) -> &CodecParam {
        &self.shared.param
    }

    /// The stream's jitter buffer
    pub fn jitter_buffer(&self) -> &JitterBuffer {
        &self.shared.jb
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        self.shared.quit.store(true, Ordering::Release);
        if let Some(handle) = self.rx_thread.take() {
            if handle.join().is_err() {
                warn!("{}: receive thread panicked", self.shared.info.name);
            }
        }
        info!("{}: stream destroyed", self.shared.info.name);
    }
}

impl StreamShared {
    fn receive_loop(&self) {
        let mut buf = vec![0u8; MAX_MTU];
        debug!("{}: receive thread started", self.info.name);

        while !self.quit.load(Ordering::Acquire) {
            let len = match self.transport.recv(&mut buf, RX_POLL_INTERVAL) {
                Ok(Some(len)) => len,
                Ok(None) => continue,
                Err(e) if e.kind() == ErrorKind::NotConnected => {
                    debug!("{}: transport closed", self.info.name);
                    break;
                }
                Err(e) => {
                    debug!("{}: receive error: {}", self.info.name, e);
                    continue;
                }
            };

            if self.dec_paused.load(Ordering::Acquire) {
                continue;
            }

            self.on_rx_packet(&buf[..len]);
        }

        debug!("{}: receive thread stopped", self.info.name);
    }

    fn on_rx_packet(&self, data: &[u8]) {
        let packet = match RtpPacket::from_bytes(data) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("{}: RTP decode error: {}", self.info.name, e);
                self.stats.write().rx_malformed += 1;
                return;
            }
        };

        let is_event = self.info.dtmf_payload_type == Some(packet.header.payload_type);

        let mut dec = self.dec.lock();
        let update = match dec.session.update(&packet.header, !is_event) {
            Ok(update) => update,
            Err(e) => {
                debug!("{}: RTP session error: {}", self.info.name, e);
                self.stats.write().rx_rejected += 1;
                return;
            }
        };

        let restarted = update.status == SeqStatus::Restarted;
        if restarted {
            info!(
                "{}: remote sequence restarted, resetting jitter buffer",
                self.info.name
            );
            self.jb.reset();
        }

        let digit = if is_event {
            dec.dtmf.on_event(packet.header.timestamp, &packet.payload)
        } else {
            None
        };
        drop(dec);

        let discarded = !is_event && self.jb.put_frame(&packet.payload, 0, update.extended);

        let mut stats = self.stats.write();
        stats.rx.packets += 1;
        stats.rx.bytes += data.len() as u64;
        if restarted {
            stats.rx_restarts += 1;
        }
        if discarded {
            stats.rx_discarded += 1;
        }
        if let Some(digit) = digit {
            stats.dtmf_received += 1;
            debug!("{}: received DTMF digit {}", self.info.name, digit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::L16Codec;
    use crate::transport::ChannelTransport;
    use std::time::Instant;

    fn info(name: &str) -> StreamInfo {
        let mut info = StreamInfo::new(name, 11);
        info.jitter = JitterMode::Fixed(1);
        info
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_direction_flags() {
        assert!(Direction::Encoding.encodes());
        assert!(!Direction::Encoding.decodes());
        assert!(Direction::EncodingDecoding.decodes());
    }

    #[test]
    fn test_rejects_bad_ptime() {
        let (a, _b) = ChannelTransport::pair();
        let result = MediaStream::create(
            info("bad"),
            Box::new(L16Codec::new(8000, 1, 0)),
            Box::new(a),
        );
        assert!(matches!(result, Err(StreamError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_bad_jitter_settings() {
        let (a, _b) = ChannelTransport::pair();
        let mut info = info("bad-jb");
        info.jitter = JitterMode::Adaptive {
            prefetch: 5,
            min: 10,
            max: 4,
        };
        let result = MediaStream::create(info, Box::new(L16Codec::new(8000, 1, 20)), Box::new(a));
        assert!(matches!(result, Err(StreamError::Jitter(_))));
    }

    #[test]
    fn test_default_jitter_capacity() {
        let (a, _b) = ChannelTransport::pair();
        let stream =
            MediaStream::create(info("cap"), Box::new(L16Codec::new(8000, 1, 20)), Box::new(a))
                .unwrap();
        assert_eq!(stream.jitter_buffer().capacity(), 100);
        assert_eq!(stream.jitter_buffer().frame_size(), 320);
    }

    #[test]
    fn test_paused_encoder_sends_nothing() {
        let (a, b) = ChannelTransport::pair();
        let stream =
            MediaStream::create(info("paused"), Box::new(L16Codec::new(8000, 1, 20)), Box::new(a))
                .unwrap();

        stream.put_frame(&[0; 160]).unwrap();
        let mut buf = [0u8; 1500];
        assert!(b.recv(&mut buf, Duration::from_millis(20)).unwrap().is_none());
        assert_eq!(stream.stats().tx.packets, 0);
    }

    #[test]
    fn test_put_frame_sends_rtp() {
        let (a, b) = ChannelTransport::pair();
        let mut info = info("tx");
        info.initial_seq = 500;
        info.initial_ts = 0;
        let stream =
            MediaStream::create(info, Box::new(L16Codec::new(8000, 1, 20)), Box::new(a)).unwrap();
        stream.start();

        let pcm: Vec<i16> = (0..160).collect();
        stream.put_frame(&pcm).unwrap();

        let mut buf = [0u8; 1500];
        let n = b.recv(&mut buf, Duration::from_millis(100)).unwrap().unwrap();
        let packet = RtpPacket::from_bytes(&buf[..n]).unwrap();
        assert_eq!(packet.header.payload_type, 11);
        assert_eq!(packet.header.seq.as_raw(), 500);
        assert_eq!(packet.header.timestamp, 160);
        assert_eq!(packet.payload.len(), 320);
        assert_eq!(&packet.payload[..4], &[0, 0, 0, 1]);

        let stats = stream.stats();
        assert_eq!(stats.tx.packets, 1);
        assert_eq!(stats.tx.bytes, 332);
    }

    #[test]
    fn test_receive_then_playout() {
        let (a, b) = ChannelTransport::pair();
        let stream =
            MediaStream::create(info("rx"), Box::new(L16Codec::new(8000, 1, 20)), Box::new(a))
                .unwrap();
        stream.start();

        for seq in 0..3u16 {
            let mut header = rtp_protocol::RtpHeader::new(11, seq.into(), seq as u32 * 160, 77);
            header.marker = seq == 0;
            let payload = bytes::Bytes::from(vec![0u8, seq as u8 + 1].repeat(160));
            let bytes = RtpPacket::new(header, payload).to_bytes().unwrap();
            b.send(&bytes).unwrap();
        }

        assert!(wait_for(|| stream.stats().rx.packets == 3));

        let mut pcm = [0i16; 160];
        for seq in 0..3i16 {
            let frame = stream.get_frame(&mut pcm);
            assert_eq!(frame.frame_type, PortFrameType::Audio);
            assert_eq!(frame.samples, 160);
            assert_eq!(pcm[0], seq + 1);
        }

        let frame = stream.get_frame(&mut pcm);
        assert_eq!(frame.frame_type, PortFrameType::None);
        assert_eq!(frame.jb_frame, FrameType::ZeroEmpty);
    }

    #[test]
    fn test_dial_dtmf_validation() {
        let (a, _b) = ChannelTransport::pair();
        let mut info = info("dtmf");
        let stream = MediaStream::create(
            info.clone(),
            Box::new(L16Codec::new(8000, 1, 20)),
            Box::new(a),
        )
        .unwrap();
        assert!(matches!(
            stream.dial_dtmf("1z"),
            Err(StreamError::InvalidDtmfDigit('z'))
        ));
        stream.dial_dtmf("123").unwrap();

        let (c, _d) = ChannelTransport::pair();
        info.dtmf_payload_type = None;
        let no_dtmf =
            MediaStream::create(info, Box::new(L16Codec::new(8000, 1, 20)), Box::new(c)).unwrap();
        assert!(matches!(
            no_dtmf.dial_dtmf("1"),
            Err(StreamError::DtmfDisabled)
        ));
    }
}
