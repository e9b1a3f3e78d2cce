//! Software MAC layer for SDR links
//!
//! Sits between an upper-layer packet source (e.g. an IP tunnel) and a
//! physical-layer modem, and arbitrates access to the shared medium with
//! one of two interchangeable protocols:
//! - CSMA/CA: carrier sensing, binary exponential backoff, ACK-timed
//!   retransmission
//! - TDMA: coordinator-driven super-frames with per-station slots
//!
//! The surrounding plumbing lives here too: a frame buffer with
//! ARP-assisted destination rewrite, a streaming carrier-sense energy
//! detector, and the switch that routes the active MAC to the modem.
//! Blocks talk over the `fabric` message-port layer.

pub mod arp;
pub mod buffer;
pub mod carrier;
pub mod csma;
pub mod frame;
pub mod switch;
pub mod tdma;
pub mod timing;
