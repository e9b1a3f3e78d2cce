//! MAC frame parsing and construction
//!
//! The wire format is a fixed 24-byte little-endian header, an MSDU of up
//! to 1500 bytes, and a 4-byte CRC-32 trailer computed over header + MSDU.

use std::fmt;
use std::str::FromStr;

use fabric::Frame;

/// Fixed MAC header length in bytes.
pub const MAC_HEADER_LEN: usize = 24;
/// CRC-32 trailer length in bytes.
pub const FCS_LEN: usize = base::crc::FCS_LEN;
/// Largest MSDU carried above the MAC header.
pub const MAX_MSDU: usize = 1500;
/// Largest PSDU on the air: header + MSDU + trailer.
pub const MAX_PSDU: usize = MAC_HEADER_LEN + MAX_MSDU + FCS_LEN;

/// Six-byte MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a[0], a[1], a[2], a[3], a[4], a[5]
        )
    }
}

/// Error parsing a colon-separated MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidMacAddr;

impl FromStr for MacAddr {
    type Err = InvalidMacAddr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or(InvalidMacAddr)?;
            *byte = u8::from_str_radix(part, 16).map_err(|_| InvalidMacAddr)?;
        }
        if parts.next().is_some() {
            return Err(InvalidMacAddr);
        }
        Ok(MacAddr(bytes))
    }
}

/// Frame kinds encoded in the 16-bit frame control field.
///
/// The numeric values are wire-visible and fixed; SYNC through SKIP are
/// reserved for the TDMA protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Data,
    Ack,
    Sync,
    Alloc,
    Req,
    Skip,
    Protocol,
}

impl FrameKind {
    /// Wire value of the frame control field.
    pub fn bits(&self) -> u16 {
        match self {
            FrameKind::Data => 0x0008,
            FrameKind::Ack => 0x2B00,
            FrameKind::Sync => 0x2000,
            FrameKind::Alloc => 0x2800,
            FrameKind::Req => 0x2400,
            FrameKind::Skip => 0x2C00,
            FrameKind::Protocol => 0x2900,
        }
    }

    pub fn from_bits(bits: u16) -> Option<FrameKind> {
        match bits {
            0x0008 => Some(FrameKind::Data),
            0x2B00 => Some(FrameKind::Ack),
            0x2000 => Some(FrameKind::Sync),
            0x2800 => Some(FrameKind::Alloc),
            0x2400 => Some(FrameKind::Req),
            0x2C00 => Some(FrameKind::Skip),
            0x2900 => Some(FrameKind::Protocol),
            _ => None,
        }
    }
}

/// The fixed 24-byte MAC header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacHeader {
    pub frame_control: u16,
    pub duration: u16,
    /// Destination.
    pub addr1: MacAddr,
    /// Source.
    pub addr2: MacAddr,
    /// BSSID; always broadcast in this MAC.
    pub addr3: MacAddr,
    pub seq_nr: u16,
}

impl MacHeader {
    /// Parse a header from the first 24 bytes of a PSDU.
    pub fn parse(data: &[u8]) -> Option<MacHeader> {
        if data.len() < MAC_HEADER_LEN {
            return None;
        }
        let mut addr1 = [0u8; 6];
        let mut addr2 = [0u8; 6];
        let mut addr3 = [0u8; 6];
        addr1.copy_from_slice(&data[4..10]);
        addr2.copy_from_slice(&data[10..16]);
        addr3.copy_from_slice(&data[16..22]);

        Some(MacHeader {
            frame_control: u16::from_le_bytes([data[0], data[1]]),
            duration: u16::from_le_bytes([data[2], data[3]]),
            addr1: MacAddr(addr1),
            addr2: MacAddr(addr2),
            addr3: MacAddr(addr3),
            seq_nr: u16::from_le_bytes([data[22], data[23]]),
        })
    }

    /// Decoded frame kind, if the frame control value is a known one.
    pub fn kind(&self) -> Option<FrameKind> {
        FrameKind::from_bits(self.frame_control)
    }

    /// Serialize into the 24-byte wire layout.
    pub fn to_bytes(&self) -> [u8; MAC_HEADER_LEN] {
        let mut out = [0u8; MAC_HEADER_LEN];
        out[0..2].copy_from_slice(&self.frame_control.to_le_bytes());
        out[2..4].copy_from_slice(&self.duration.to_le_bytes());
        out[4..10].copy_from_slice(self.addr1.as_bytes());
        out[10..16].copy_from_slice(self.addr2.as_bytes());
        out[16..22].copy_from_slice(self.addr3.as_bytes());
        out[22..24].copy_from_slice(&self.seq_nr.to_le_bytes());
        out
    }
}

/// Compose a full PSDU: header, MSDU, CRC-32 trailer.
///
/// `addr3` is always the broadcast BSSID. MSDUs longer than [`MAX_MSDU`]
/// are truncated; nothing internal builds one that large.
pub fn build_frame(kind: FrameKind, seq_nr: u16, dst: MacAddr, src: MacAddr, msdu: &[u8]) -> Frame {
    let msdu = &msdu[..msdu.len().min(MAX_MSDU)];
    let header = MacHeader {
        frame_control: kind.bits(),
        duration: 0,
        addr1: dst,
        addr2: src,
        addr3: MacAddr::BROADCAST,
        seq_nr,
    };
    let mut psdu = Vec::with_capacity(MAC_HEADER_LEN + msdu.len() + FCS_LEN);
    psdu.extend_from_slice(&header.to_bytes());
    psdu.extend_from_slice(msdu);
    Frame::with_crc(base::crc::append_fcs(psdu))
}

/// Build the ACK answering a received data frame.
///
/// The received frame is left untouched so it can still be delivered
/// upward intact: the ACK gets a fresh 28-byte PSDU with the addresses
/// swapped (addr1 = original source, addr2 = the acking node) and the
/// duration and sequence number copied through.
pub fn build_ack(received: &MacHeader, our_addr: MacAddr) -> Frame {
    let ack = MacHeader {
        frame_control: FrameKind::Ack.bits(),
        duration: received.duration,
        addr1: received.addr2,
        addr2: our_addr,
        addr3: received.addr3,
        seq_nr: received.seq_nr,
    };
    Frame::with_crc(base::crc::append_fcs(ack.to_bytes().to_vec()))
}
