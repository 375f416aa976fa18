//! Tail tag codec.
//!
//! With tail tagging enabled, every frame on the host link carries one
//! trailing byte:
//!
//! - transmit: bitmask of destination ports (bit `i` is port `i`), or the
//!   flood sentinel [`TAIL_TAG_FLOOD`];
//! - receive: exactly one bit naming the source port, or the host sentinel
//!   [`TAIL_TAG_HOST`].
//!
//! Bits 6 and 7 carry the sentinels, so at most [`TAIL_TAG_MAX_PORTS`]
//! ports can be addressed. The codec is pure and needs no lock.

use crate::error::{Result, SwitchError};
use crate::types::{PortMask, ETH_ZLEN};

/// Transmit sentinel: deliver to every port.
pub const TAIL_TAG_FLOOD: u8 = 0x80;

/// Receive sentinel: frame originated from the host.
pub const TAIL_TAG_HOST: u8 = 0x40;

/// Ports addressable by the tag.
pub const TAIL_TAG_MAX_PORTS: usize = 6;

/// Bytes added to each frame.
pub const TAIL_TAG_LEN: usize = 1;

/// Where a transmitted frame should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxDestination {
    Ports(PortMask),
    Flood,
}

/// Where a received frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxSource {
    Port(usize),
    Host,
}

/// Encoder/decoder for one switch's tail tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailTagCodec {
    port_count: usize,
    min_frame_len: usize,
}

impl TailTagCodec {
    pub fn new(port_count: usize) -> Result<Self> {
        if port_count == 0 || port_count > TAIL_TAG_MAX_PORTS {
            return Err(SwitchError::InvalidPort(port_count));
        }
        Ok(Self {
            port_count,
            min_frame_len: ETH_ZLEN,
        })
    }

    /// Overrides the minimum tag-safe frame length.
    pub fn with_min_frame_len(mut self, min_frame_len: usize) -> Self {
        self.min_frame_len = min_frame_len;
        self
    }

    pub fn port_count(&self) -> usize {
        self.port_count
    }

    pub fn min_frame_len(&self) -> usize {
        self.min_frame_len
    }

    pub fn encode(&self, destination: TxDestination) -> Result<u8> {
        match destination {
            TxDestination::Flood => Ok(TAIL_TAG_FLOOD),
            TxDestination::Ports(mask) => self.encode_mask(u32::from(mask.bits())),
        }
    }

    /// Encodes a raw destination mask.
    ///
    /// Masks wider than a byte, empty masks and masks naming ports beyond
    /// the active port count are rejected.
    pub fn encode_mask(&self, mask: u32) -> Result<u8> {
        let bits = u8::try_from(mask).map_err(|_| SwitchError::InvalidPortMask(mask))?;
        let ports = PortMask::from_bits(bits);
        if ports.is_empty() || !ports.fits(self.port_count) {
            return Err(SwitchError::InvalidPortMask(mask));
        }
        Ok(bits)
    }

    pub fn encode_single_port(&self, port: usize) -> Result<u8> {
        if port >= self.port_count {
            return Err(SwitchError::InvalidPort(port));
        }
        Ok(PortMask::single(port).bits())
    }

    pub fn decode(&self, tag: u8) -> Result<RxSource> {
        if tag == TAIL_TAG_HOST {
            return Ok(RxSource::Host);
        }
        if tag.count_ones() != 1 {
            return Err(SwitchError::InvalidTag(tag));
        }
        let port = tag.trailing_zeros() as usize;
        if port >= self.port_count {
            return Err(SwitchError::InvalidTag(tag));
        }
        Ok(RxSource::Port(port))
    }

    /// Appends the tag to a frame of at least the minimum length.
    pub fn append(&self, frame: &mut Vec<u8>, destination: TxDestination) -> Result<()> {
        if frame.len() < self.min_frame_len {
            return Err(SwitchError::FrameTooShort {
                len: frame.len(),
                min: self.min_frame_len,
            });
        }
        let tag = self.encode(destination)?;
        frame.push(tag);
        Ok(())
    }

    /// Zero-pads a short frame to the minimum length, then appends the tag.
    pub fn pad_and_append(&self, frame: &mut Vec<u8>, destination: TxDestination) -> Result<()> {
        let tag = self.encode(destination)?;
        if frame.len() < self.min_frame_len {
            frame.resize(self.min_frame_len, 0);
        }
        frame.push(tag);
        Ok(())
    }

    /// Removes and decodes the trailing tag.
    ///
    /// On error the frame is left untouched; the caller must drop it.
    pub fn strip(&self, frame: &mut Vec<u8>) -> Result<RxSource> {
        let tag = *frame.last().ok_or(SwitchError::FrameTooShort {
            len: 0,
            min: TAIL_TAG_LEN,
        })?;
        let source = self.decode(tag)?;
        frame.truncate(frame.len() - TAIL_TAG_LEN);
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TailTagCodec {
        TailTagCodec::new(5).unwrap()
    }

    #[test]
    fn test_single_port_round_trip() {
        let codec = codec();
        for port in 0..codec.port_count() {
            let tag = codec.encode_single_port(port).unwrap();
            assert_eq!(codec.decode(tag).unwrap(), RxSource::Port(port));
        }
        assert!(codec.encode_single_port(5).is_err());
    }

    #[test]
    fn test_decode_rejects_zero_and_multi_bit() {
        let codec = codec();
        assert!(matches!(codec.decode(0x00), Err(SwitchError::InvalidTag(0x00))));
        assert!(matches!(codec.decode(0x03), Err(SwitchError::InvalidTag(0x03))));
        assert!(matches!(codec.decode(0x1f), Err(SwitchError::InvalidTag(0x1f))));
        // Flood is transmit-only.
        assert!(matches!(codec.decode(TAIL_TAG_FLOOD), Err(SwitchError::InvalidTag(_))));
        // Inactive port.
        assert!(matches!(codec.decode(0x20), Err(SwitchError::InvalidTag(0x20))));
    }

    #[test]
    fn test_decode_host_sentinel() {
        assert_eq!(codec().decode(TAIL_TAG_HOST).unwrap(), RxSource::Host);
    }

    #[test]
    fn test_decode_bit_two_is_port_two() {
        assert_eq!(codec().decode(0x04).unwrap(), RxSource::Port(2));
    }

    #[test]
    fn test_flood_is_explicit() {
        let codec = codec();
        assert_eq!(codec.encode(TxDestination::Flood).unwrap(), TAIL_TAG_FLOOD);
        // An all-ones mask stays a plain mask.
        assert_eq!(
            codec
                .encode(TxDestination::Ports(PortMask::all(5)))
                .unwrap(),
            0x1f
        );
    }

    #[test]
    fn test_encode_mask_validation() {
        let codec = codec();
        assert_eq!(codec.encode_mask(0b00011).unwrap(), 0b00011);
        assert!(matches!(codec.encode_mask(0x100), Err(SwitchError::InvalidPortMask(0x100))));
        assert!(matches!(codec.encode_mask(0), Err(SwitchError::InvalidPortMask(0))));
        assert!(matches!(codec.encode_mask(0x20), Err(SwitchError::InvalidPortMask(0x20))));
    }

    #[test]
    fn test_port_count_limits() {
        assert!(TailTagCodec::new(0).is_err());
        assert!(TailTagCodec::new(TAIL_TAG_MAX_PORTS).is_ok());
        assert!(TailTagCodec::new(TAIL_TAG_MAX_PORTS + 1).is_err());
    }

    #[test]
    fn test_append_rejects_short_frame() {
        let codec = codec();
        let mut frame = vec![0u8; 20];
        assert!(matches!(
            codec.append(&mut frame, TxDestination::Flood),
            Err(SwitchError::FrameTooShort { len: 20, min: 60 })
        ));
        assert_eq!(frame.len(), 20);

        let mut frame = vec![0u8; 64];
        codec
            .append(&mut frame, TxDestination::Ports(PortMask::single(1)))
            .unwrap();
        assert_eq!(frame.len(), 65);
        assert_eq!(frame[64], 0x02);
    }

    #[test]
    fn test_pad_and_append() {
        let codec = codec();
        let mut frame = vec![0xaa; 42];
        codec.pad_and_append(&mut frame, TxDestination::Flood).unwrap();
        assert_eq!(frame.len(), ETH_ZLEN + TAIL_TAG_LEN);
        assert_eq!(frame[41], 0xaa);
        assert_eq!(frame[42], 0);
        assert_eq!(*frame.last().unwrap(), TAIL_TAG_FLOOD);
    }

    #[test]
    fn test_strip() {
        let codec = codec();
        let mut frame = vec![0u8; 60];
        frame.push(0x08);
        assert_eq!(codec.strip(&mut frame).unwrap(), RxSource::Port(3));
        assert_eq!(frame.len(), 60);

        let mut bad = vec![0u8; 60];
        bad.push(0x00);
        assert!(codec.strip(&mut bad).is_err());
        assert_eq!(bad.len(), 61);

        assert!(matches!(
            codec.strip(&mut Vec::new()),
            Err(SwitchError::FrameTooShort { len: 0, .. })
        ));
    }

    #[test]
    fn test_custom_min_frame_len() {
        let codec = codec().with_min_frame_len(16);
        let mut frame = vec![0u8; 16];
        assert!(codec.append(&mut frame, TxDestination::Flood).is_ok());
    }
}
