//! Linux ARP cache lookup
//!
//! Resolves IPv4 destinations to MAC addresses from the kernel ARP table,
//! so frames built with a placeholder destination can be rewritten on
//! their way into the transmit queue.

use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use anyhow::{Context, Result};

use crate::frame::MacAddr;

/// Default location of the kernel ARP table.
pub const ARP_CACHE: &str = "/proc/net/arp";

/// One resolved ARP entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpEntry {
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
}

/// Snapshot of the host ARP table.
#[derive(Debug, Clone, Default)]
pub struct ArpTable {
    entries: Vec<ArpEntry>,
}

impl ArpTable {
    /// Read and parse an ARP cache file.
    ///
    /// The file is line-oriented text: the first line is a column header
    /// and is skipped, each following line is
    /// `ip hwtype flags mac mask device`. Malformed lines are ignored.
    pub fn load(path: impl AsRef<Path>) -> Result<ArpTable> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading ARP cache {}", path.display()))?;
        let entries = text.lines().skip(1).filter_map(parse_line).collect();
        Ok(ArpTable { entries })
    }

    pub fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.entries.iter().find(|e| e.ip == ip).map(|e| e.mac)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse one ARP table line: dotted IPv4 in column 1, colon-hex MAC in
/// column 4.
fn parse_line(line: &str) -> Option<ArpEntry> {
    let mut cols = line.split_whitespace();
    let ip = cols.next()?.parse::<Ipv4Addr>().ok()?;
    let _hwtype = cols.next()?;
    let _flags = cols.next()?;
    let mac = cols.next()?.parse::<MacAddr>().ok()?;
    Some(ArpEntry { ip, mac })
}
