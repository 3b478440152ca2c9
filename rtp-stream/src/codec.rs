//! Codec collaborator interface
//!
//! The stream never interprets audio itself: a [`Codec`] turns PCM frames
//! into payload bytes and back. [`L16Codec`] is a reference implementation
//! carrying 16-bit linear PCM in network byte order.

use thiserror::Error;

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Payload length {0} is not a whole number of samples")]
    OddPayload(usize),

    #[error("Encoded frame of {len} bytes exceeds the maximum of {max}")]
    FrameTooLarge { len: usize, max: usize },
}

/// Codec parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecParam {
    /// Sampling rate in Hz
    pub clock_rate: u32,
    /// Number of interleaved channels
    pub channel_count: u8,
    /// Bits per PCM sample
    pub bits_per_sample: u8,
    /// Frame duration in milliseconds
    pub ptime: u32,
    /// Average encoded bitrate in bits per second
    pub avg_bps: u32,
}

impl CodecParam {
    /// Size of one encoded frame in bytes
    pub fn frame_size(&self) -> usize {
        (self.avg_bps as u64 / 8 * self.ptime as u64 / 1000) as usize
    }

    /// PCM samples in one frame, all channels included
    pub fn samples_per_frame(&self) -> usize {
        (self.clock_rate as u64 * self.ptime as u64 / 1000 * self.channel_count as u64) as usize
    }
}

/// Audio codec
pub trait Codec: Send {
    /// Parameters of this codec instance
    fn param(&self) -> &CodecParam;

    /// Encode one PCM frame, appending the payload to `out`
    fn encode(&mut self, pcm: &[i16], out: &mut Vec<u8>) -> Result<(), CodecError>;

    /// Decode one payload into `pcm`, returning the number of samples written
    fn decode(&mut self, payload: &[u8], pcm: &mut [i16]) -> Result<usize, CodecError>;
}

/// 16-bit linear PCM codec
#[derive(Debug, Clone)]
pub struct L16Codec {
    param: CodecParam,
}

impl L16Codec {
    /// Create an L16 codec
    pub fn new(clock_rate: u32, channel_count: u8, ptime: u32) -> Self {
        L16Codec {
            param: CodecParam {
                clock_rate,
                channel_count,
                bits_per_sample: 16,
                ptime,
                avg_bps: clock_rate * 16 * channel_count as u32,
            },
        }
    }
}

impl Codec for L16Codec {
    fn param(&self) -> &CodecParam {
        &self.param
    }

    fn encode(&mut self, pcm: &[i16], out: &mut Vec<u8>) -> Result<(), CodecError> {
        let max = self.param.frame_size();
        if pcm.len() * 2 > max {
            return Err(CodecError::FrameTooLarge {
                len: pcm.len() * 2,
                max,
            });
        }

        out.reserve(pcm.len() * 2);
        for sample in pcm {
            out.extend_from_slice(&sample.to_be_bytes());
        }
        Ok(())
    }

    fn decode(&mut self, payload: &[u8], pcm: &mut [i16]) -> Result<usize, CodecError> {
        if payload.len() % 2 != 0 {
            return Err(CodecError::OddPayload(payload.len()));
        }

        let count = (payload.len() / 2).min(pcm.len());
        for (sample, bytes) in pcm.iter_mut().zip(payload.chunks_exact(2)).take(count) {
            *sample = i16::from_be_bytes([bytes[0], bytes[1]]);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l16_param() {
        let codec = L16Codec::new(8000, 1, 20);
        assert_eq!(codec.param().frame_size(), 320);
        assert_eq!(codec.param().samples_per_frame(), 160);

        let stereo = L16Codec::new(16000, 2, 10);
        assert_eq!(stereo.param().frame_size(), 640);
        assert_eq!(stereo.param().samples_per_frame(), 320);
    }

    #[test]
    fn test_l16_network_order() {
        let mut codec = L16Codec::new(8000, 1, 20);
        let mut out = Vec::new();
        codec.encode(&[0x0102, -2], &mut out).unwrap();
        assert_eq!(out, vec![0x01, 0x02, 0xFF, 0xFE]);

        let mut pcm = [0i16; 2];
        assert_eq!(codec.decode(&out, &mut pcm).unwrap(), 2);
        assert_eq!(pcm, [0x0102, -2]);
    }

    #[test]
    fn test_l16_rejects_oversized_frame() {
        let mut codec = L16Codec::new(8000, 1, 20);
        let mut out = Vec::new();
        assert!(codec.encode(&[0; 161], &mut out).is_err());
    }

    #[test]
    fn test_l16_decode_truncates_to_output() {
        let mut codec = L16Codec::new(8000, 1, 20);
        let mut pcm = [0i16; 1];
        assert_eq!(codec.decode(&[0, 1, 0, 2], &mut pcm).unwrap(), 1);
        assert_eq!(pcm, [1]);
        assert!(codec.decode(&[0, 1, 0], &mut pcm).is_err());
    }
}
