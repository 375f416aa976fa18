//! Frame metadata used by port steering.

use crate::error::{Result, SwitchError};
use crate::types::{MacAddress, VLAN_ID_MAX};

/// 802.1Q tag protocol identifier.
pub const ETH_P_8021Q: u16 = 0x8100;

/// Destination, source and ethertype.
pub const ETH_HLEN: usize = 14;

const VLAN_HLEN: usize = 4;

/// The parts of a frame that steering decisions depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub dst: MacAddress,
    /// VLAN id from an 802.1Q tag; `None` for untagged and priority-tagged
    /// frames.
    pub vid: Option<u16>,
    /// Physical port the frame was submitted on.
    pub port: usize,
}

impl FrameHeader {
    pub fn new(dst: MacAddress, vid: Option<u16>, port: usize) -> Self {
        Self { dst, vid, port }
    }

    /// Reads the destination address and VLAN tag of an Ethernet frame.
    pub fn parse(frame: &[u8], port: usize) -> Result<Self> {
        if frame.len() < ETH_HLEN {
            return Err(SwitchError::FrameTooShort {
                len: frame.len(),
                min: ETH_HLEN,
            });
        }
        let mut dst = [0u8; 6];
        dst.copy_from_slice(&frame[..6]);

        let ethertype = u16::from_be_bytes([frame[12], frame[13]]);
        let vid = if ethertype == ETH_P_8021Q {
            if frame.len() < ETH_HLEN + VLAN_HLEN {
                return Err(SwitchError::FrameTooShort {
                    len: frame.len(),
                    min: ETH_HLEN + VLAN_HLEN,
                });
            }
            let tci = u16::from_be_bytes([frame[14], frame[15]]);
            Some(tci & VLAN_ID_MAX).filter(|&vid| vid != 0)
        } else {
            None
        };

        Ok(Self {
            dst: MacAddress::new(dst),
            vid,
            port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frame(dst: [u8; 6], tag: Option<u16>) -> Vec<u8> {
        let mut frame = dst.to_vec();
        frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x01]);
        if let Some(tci) = tag {
            frame.extend_from_slice(&ETH_P_8021Q.to_be_bytes());
            frame.extend_from_slice(&tci.to_be_bytes());
        }
        frame.extend_from_slice(&[0x08, 0x00]);
        frame.resize(60, 0);
        frame
    }

    #[test]
    fn test_parse_untagged() {
        let dst = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];
        let header = FrameHeader::parse(&frame(dst, None), 3).unwrap();
        assert_eq!(header, FrameHeader::new(MacAddress::new(dst), None, 3));
    }

    #[test]
    fn test_parse_tagged() {
        // PCP 5, VID 100
        let header = FrameHeader::parse(&frame([0xff; 6], Some(0xa064)), 0).unwrap();
        assert_eq!(header.vid, Some(100));
        assert!(header.dst.is_broadcast());
    }

    #[test]
    fn test_parse_priority_tagged_is_untagged() {
        let header = FrameHeader::parse(&frame([0xff; 6], Some(0x6000)), 0).unwrap();
        assert_eq!(header.vid, None);
    }

    #[test]
    fn test_parse_short_frames() {
        assert!(matches!(
            FrameHeader::parse(&[0u8; 10], 0),
            Err(SwitchError::FrameTooShort { len: 10, min: 14 })
        ));
        let mut truncated = vec![0u8; 12];
        truncated.extend_from_slice(&ETH_P_8021Q.to_be_bytes());
        assert!(matches!(
            FrameHeader::parse(&truncated, 0),
            Err(SwitchError::FrameTooShort { len: 14, min: 18 })
        ));
    }
}
