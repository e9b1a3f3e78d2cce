//! CSMA/CA MAC block
//!
//! Contention-based medium access, loosely modeled on the IEEE 802.11 DCF:
//! listen before talk via the carrier-sense block, transmit, wait for the
//! ACK, and back off exponentially while the medium stays busy. A frame is
//! given up after `MAX_RETRIES` transmissions or `MAX_RETRIES` total
//! probe rounds, whichever comes first.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{Builder, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, warn};
use rand::Rng;

use fabric::{Frame, Handler, InPort, Mailbox, Message, OutPort};

use crate::frame::{build_ack, FrameKind, MacAddr, MacHeader};
use crate::timing;

/// Retransmission budget per frame; also caps busy-medium probe rounds.
pub const MAX_RETRIES: u32 = 5;
/// Local transmit buffer depth.
pub const MAX_LOCAL_BUFF: usize = 3;
/// Minimum contention window.
pub const ACW_MIN: u32 = 16;
/// Maximum contention window.
pub const ACW_MAX: u32 = 1024;
/// Receive-path PHY latency in µs, before alpha scaling.
const RX_PHY_DELAY: u64 = 1;
/// Scheduler latency budget between blocks, in µs.
const AVG_BLOCK_DELAY: u64 = 1000;
/// How long blocked threads wait before re-checking the running flag.
const PARK: Duration = Duration::from_millis(20);

/// CSMA/CA configuration. Timing fields are in µs before alpha scaling.
#[derive(Debug, Clone)]
pub struct CsmaConfig {
    /// This node's source address.
    pub addr: MacAddr,
    pub slot_time: u64,
    pub sifs: u64,
    pub difs: u64,
    /// Scale applied to every timing constant to absorb the latency of the
    /// SDR pipeline.
    pub alpha: u64,
    /// Power above which the medium counts as busy, in dBm.
    pub threshold: f32,
    pub debug: bool,
}

impl Default for CsmaConfig {
    fn default() -> Self {
        // 802.11a/g timing, unscaled.
        Self {
            addr: MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
            slot_time: 9,
            sifs: 16,
            difs: 34,
            alpha: 1,
            threshold: -80.0,
            debug: false,
        }
    }
}

/// The CSMA/CA MAC block.
///
/// Connect all ports before calling [`CsmaCa::start`]; the pump begins
/// requesting frames as soon as it runs.
pub struct CsmaCa {
    inner: Arc<Inner>,
    mailbox: Mailbox,
    threads: Vec<JoinHandle<()>>,
}

struct Inner {
    cfg: CsmaConfig,
    // Alpha-scaled timing, µs.
    slot: u64,
    sifs: u64,
    difs: u64,

    running: AtomicBool,
    buff: Mutex<VecDeque<Frame>>,
    new_frame: Condvar,
    /// Set by the RX handler when the ACK for the head frame arrives.
    acked: AtomicBool,
    /// Sequence number of the frame currently being sent.
    head_seq: AtomicU16,
    /// Contention window; persists across frames, reset on success.
    cw: AtomicU32,

    sensing: Mutex<Sensing>,
    cs_reply: Condvar,

    frame_to_phy: OutPort,
    frame_request: OutPort,
    request_to_cs: OutPort,
    frame_to_app: OutPort,
}

struct Sensing {
    active: bool,
    power: f32,
}

impl CsmaCa {
    pub fn new(cfg: CsmaConfig) -> Self {
        let inner = Arc::new(Inner {
            slot: cfg.slot_time * cfg.alpha,
            sifs: cfg.sifs * cfg.alpha,
            difs: cfg.difs * cfg.alpha,
            cfg,
            running: AtomicBool::new(true),
            buff: Mutex::new(VecDeque::with_capacity(MAX_LOCAL_BUFF)),
            new_frame: Condvar::new(),
            acked: AtomicBool::new(false),
            head_seq: AtomicU16::new(0),
            cw: AtomicU32::new(ACW_MIN),
            sensing: Mutex::new(Sensing {
                active: false,
                power: 0.0,
            }),
            cs_reply: Condvar::new(),
            frame_to_phy: OutPort::new(),
            frame_request: OutPort::new(),
            request_to_cs: OutPort::new(),
            frame_to_app: OutPort::new(),
        });
        Self {
            inner,
            mailbox: Mailbox::new(),
            threads: Vec::new(),
        }
    }

    // Input ports.

    pub fn frame_from_buffer(&self) -> InPort {
        self.mailbox.in_port("frame from buffer")
    }

    pub fn frame_from_phy(&self) -> InPort {
        self.mailbox.in_port("frame from phy")
    }

    pub fn cs_in(&self) -> InPort {
        self.mailbox.in_port("cs in")
    }

    // Output ports.

    pub fn frame_to_phy(&self) -> &OutPort {
        &self.inner.frame_to_phy
    }

    pub fn frame_request(&self) -> &OutPort {
        &self.inner.frame_request
    }

    pub fn request_to_cs(&self) -> &OutPort {
        &self.inner.request_to_cs
    }

    pub fn frame_to_app(&self) -> &OutPort {
        &self.inner.frame_to_app
    }

    /// Frames waiting in the local transmit buffer.
    pub fn pending(&self) -> usize {
        self.inner.lock_buff().len()
    }

    /// Current contention window.
    pub fn contention_window(&self) -> u32 {
        self.inner.cw.load(Ordering::Acquire)
    }

    /// Start the dispatcher, pump and sender threads.
    pub fn start(&mut self) -> Result<()> {
        self.threads
            .push(self.mailbox.spawn("csma-dispatch", self.inner.clone())?);

        let inner = self.inner.clone();
        self.threads.push(
            Builder::new()
                .name("csma-pump".into())
                .spawn(move || inner.pump())
                .context("spawning csma pump")?,
        );

        let inner = self.inner.clone();
        self.threads.push(
            Builder::new()
                .name("csma-send".into())
                .spawn(move || inner.sender())
                .context("spawning csma sender")?,
        );
        Ok(())
    }

    /// Stop all threads and wait for them.
    pub fn stop(&mut self) {
        self.inner.running.store(false, Ordering::Release);
        self.inner.new_frame.notify_all();
        self.inner.cs_reply.notify_all();
        self.mailbox.halt();
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }
}

impl Drop for CsmaCa {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Handler for Inner {
    fn handle(&self, port: &str, msg: Message) {
        match (port, msg) {
            ("frame from buffer", Message::Frame(frame)) => self.frame_from_buffer(frame),
            ("frame from phy", Message::Frame(frame)) => self.frame_from_phy(frame),
            ("cs in", Message::Float(power)) => self.cs_in(power),
            (port, msg) => debug!("csma: unexpected message on {port}: {msg:?}"),
        }
    }
}

impl Inner {
    fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn acked(&self) -> bool {
        self.acked.load(Ordering::Acquire)
    }

    fn lock_buff(&self) -> std::sync::MutexGuard<'_, VecDeque<Frame>> {
        self.buff.lock().expect("csma buffer poisoned")
    }

    /// Keep the local buffer topped up from the frame buffer block.
    fn pump(&self) {
        while self.running() {
            if self.lock_buff().len() < MAX_LOCAL_BUFF {
                self.frame_request.publish(Message::symbol("get frame"));
                timing::sleep_us(AVG_BLOCK_DELAY, || !self.running());
            } else {
                let wait = (self.slot + self.sifs + self.difs) * MAX_LOCAL_BUFF as u64 * 8 / 10;
                timing::sleep_us(wait, || !self.running());
            }
        }
    }

    fn frame_from_buffer(&self, frame: Frame) {
        let mut buff = self.lock_buff();
        if buff.len() < MAX_LOCAL_BUFF {
            buff.push_back(frame);
            self.new_frame.notify_all();
        } else if self.cfg.debug {
            debug!("csma: local buffer full, frame rejected");
        }
    }

    /// Transmission loop: one head-of-buffer frame at a time.
    fn sender(&self) {
        while self.running() {
            let head = {
                let mut buff = self.lock_buff();
                loop {
                    if !self.running() {
                        return;
                    }
                    if let Some(frame) = buff.front() {
                        break frame.clone();
                    }
                    buff = self
                        .new_frame
                        .wait_timeout(buff, PARK)
                        .expect("csma buffer poisoned")
                        .0;
                }
            };
            self.transmit(&head);
        }
    }

    /// Carrier sense, transmit, wait for the ACK, back off on a busy
    /// medium. Pops the head frame when done, acknowledged or not.
    fn transmit(&self, frame: &Frame) {
        let Some(header) = MacHeader::parse(&frame.data) else {
            warn!("csma: malformed frame in transmit buffer, dropped");
            self.finish_head();
            return;
        };
        self.head_seq.store(header.seq_nr, Ordering::Release);
        self.acked.store(false, Ordering::Release);
        let is_broadcast = header.addr1.is_broadcast();

        let mut attempts = 0u32;
        let mut total = 0u32;
        // The first probe listens for a full DIFS; after a busy probe the
        // next one listens for the drawn backoff window instead.
        let mut sensing_time = self.difs;

        while attempts < MAX_RETRIES && total < MAX_RETRIES && !self.acked() && self.running() {
            let busy = self.is_channel_busy(self.cfg.threshold, sensing_time);
            if self.cfg.debug {
                debug!("csma: channel busy = {busy}, acked = {}", self.acked());
            }

            if !busy && !self.acked() {
                self.frame_to_phy.publish(Message::Frame(frame.clone()));
                attempts += 1;

                if is_broadcast {
                    // No ACK is expected for broadcast frames.
                    self.acked.store(true, Ordering::Release);
                    if self.cfg.debug {
                        debug!("csma: broadcast frame sent");
                    }
                    break;
                }

                let timeout = self.sifs + self.slot + RX_PHY_DELAY * self.cfg.alpha;
                timing::pause_us(timeout, || self.acked() || !self.running());
            } else if busy && !self.acked() {
                // BackoffTime = Random() × aSlotTime, Random drawn below
                // the current contention window.
                let cw = self.cw.load(Ordering::Acquire);
                let backoff = rand::thread_rng().gen_range(0..cw) as u64;
                self.cw.store((cw * 2).min(ACW_MAX), Ordering::Release);
                sensing_time = backoff * self.slot;
                if self.cfg.debug {
                    debug!("csma: backoff {backoff} slots ({sensing_time} us)");
                }
            }

            if !is_broadcast {
                total += 1;
            }
        }

        if self.acked() {
            self.cw.store(ACW_MIN, Ordering::Release);
            if self.cfg.debug {
                debug!("csma: frame acked");
            }
        } else if attempts >= MAX_RETRIES {
            warn!("csma: retry limit reached, frame dropped");
        } else if total >= MAX_RETRIES {
            warn!("csma: medium too busy, frame dropped");
        }

        self.finish_head();
    }

    fn finish_head(&self) {
        self.acked.store(false, Ordering::Release);
        self.lock_buff().pop_front();
    }

    /// Round-trip to the carrier-sense block: request a measurement over
    /// `sensing_us`, block until the reply arrives, compare to the
    /// threshold.
    fn is_channel_busy(&self, threshold: f32, sensing_us: u64) -> bool {
        {
            let mut sensing = self.sensing.lock().expect("csma sensing poisoned");
            sensing.active = true;
        }
        self.request_to_cs
            .publish(Message::Symbol(sensing_us.to_string()));

        let mut sensing = self.sensing.lock().expect("csma sensing poisoned");
        while sensing.active {
            if !self.running() {
                return false;
            }
            sensing = self
                .cs_reply
                .wait_timeout(sensing, PARK)
                .expect("csma sensing poisoned")
                .0;
        }
        if self.cfg.debug {
            debug!("csma: medium power {:.1} dBm", sensing.power);
        }
        sensing.power >= threshold
    }

    fn cs_in(&self, power: f32) {
        let mut sensing = self.sensing.lock().expect("csma sensing poisoned");
        sensing.power = power;
        sensing.active = false;
        self.cs_reply.notify_all();
    }

    fn frame_from_phy(&self, frame: Frame) {
        let Some(header) = MacHeader::parse(&frame.data) else {
            debug!("csma: malformed frame from phy, dropped");
            return;
        };
        let is_broadcast = header.addr1.is_broadcast();
        let is_mine = header.addr1 == self.cfg.addr;
        if !is_mine && !is_broadcast {
            if self.cfg.debug {
                debug!("csma: frame for {}, dropped", header.addr1);
            }
            return;
        }

        match header.kind() {
            Some(FrameKind::Data) => {
                if is_mine {
                    let ack = build_ack(&header, self.cfg.addr);
                    self.frame_to_phy.publish(Message::Frame(ack));
                    self.frame_to_app.publish(Message::Frame(frame));
                    if self.cfg.debug {
                        debug!("csma: data frame {} received, ack sent", header.seq_nr);
                    }
                }
            }
            Some(FrameKind::Ack) => {
                let waiting = !self.lock_buff().is_empty();
                if is_mine && waiting && header.seq_nr == self.head_seq.load(Ordering::Acquire) {
                    self.acked.store(true, Ordering::Release);
                    if self.cfg.debug {
                        debug!("csma: ack {} matched", header.seq_nr);
                    }
                }
            }
            Some(FrameKind::Protocol) => {
                // Reserved for protocol negotiation.
            }
            _ => {
                if self.cfg.debug {
                    debug!("csma: unknown frame control {:#06x}", header.frame_control);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::build_frame;
    use fabric::probe;
    use std::time::Duration;

    fn addr(last: u8) -> MacAddr {
        MacAddr([0x02, 0, 0, 0, 0, last])
    }

    #[test]
    fn config_defaults_are_dcf_shaped() {
        let cfg = CsmaConfig::default();
        assert_eq!(cfg.slot_time, 9);
        assert_eq!(cfg.sifs, 16);
        assert_eq!(cfg.difs, 34);
        assert_eq!(cfg.alpha, 1);
    }

    #[test]
    fn local_buffer_rejects_overflow() {
        let mac = CsmaCa::new(CsmaConfig::default());
        for seq in 0..5 {
            mac.inner
                .frame_from_buffer(build_frame(FrameKind::Data, seq, addr(2), addr(1), b"x"));
        }
        assert_eq!(mac.pending(), MAX_LOCAL_BUFF);
    }

    #[test]
    fn rx_data_for_us_produces_ack_and_delivery() {
        let mut mac = CsmaCa::new(CsmaConfig {
            addr: addr(2),
            ..CsmaConfig::default()
        });
        let (phy, phy_rx) = probe("phy");
        let (app, app_rx) = probe("app");
        mac.frame_to_phy().connect(&phy);
        mac.frame_to_app().connect(&app);

        let data = build_frame(FrameKind::Data, 7, addr(2), addr(1), b"hello");
        mac.inner.frame_from_phy(data.clone());
        mac.stop();

        let (_, ack) = phy_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        let ack = ack.into_frame().unwrap();
        let ack_header = MacHeader::parse(&ack.data).unwrap();
        assert_eq!(ack_header.kind(), Some(FrameKind::Ack));
        assert_eq!(ack_header.addr1, addr(1));
        assert_eq!(ack_header.addr2, addr(2));
        assert_eq!(ack_header.seq_nr, 7);

        let (_, delivered) = app_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(delivered.into_frame().unwrap(), data);
    }

    #[test]
    fn rx_misaddressed_frame_is_dropped() {
        let mac = CsmaCa::new(CsmaConfig {
            addr: addr(2),
            ..CsmaConfig::default()
        });
        let (phy, phy_rx) = probe("phy");
        mac.inner.frame_to_phy.connect(&phy);

        mac.inner
            .frame_from_phy(build_frame(FrameKind::Data, 1, addr(9), addr(1), b"x"));
        assert!(phy_rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn ack_with_wrong_seq_is_ignored() {
        let mac = CsmaCa::new(CsmaConfig {
            addr: addr(1),
            ..CsmaConfig::default()
        });
        // Simulate a frame in flight with seq 7.
        mac.inner
            .frame_from_buffer(build_frame(FrameKind::Data, 7, addr(2), addr(1), b"x"));
        mac.inner.head_seq.store(7, Ordering::Release);

        mac.inner
            .frame_from_phy(build_frame(FrameKind::Ack, 8, addr(1), addr(2), &[]));
        assert!(!mac.inner.acked());

        mac.inner
            .frame_from_phy(build_frame(FrameKind::Ack, 7, addr(1), addr(2), &[]));
        assert!(mac.inner.acked());
    }

    #[test]
    fn ack_without_pending_frame_is_ignored() {
        let mac = CsmaCa::new(CsmaConfig {
            addr: addr(1),
            ..CsmaConfig::default()
        });
        mac.inner.head_seq.store(7, Ordering::Release);
        mac.inner
            .frame_from_phy(build_frame(FrameKind::Ack, 7, addr(1), addr(2), &[]));
        assert!(!mac.inner.acked());
    }

    #[test]
    fn cs_reply_wakes_channel_probe() {
        let mac = Arc::new(CsmaCa::new(CsmaConfig::default()));
        let inner = mac.inner.clone();

        let prober = std::thread::spawn(move || inner.is_channel_busy(-80.0, 100));
        // Wait for the probe to mark itself sensing, then reply.
        loop {
            {
                let sensing = mac.inner.sensing.lock().unwrap();
                if sensing.active {
                    break;
                }
            }
            std::thread::sleep(Duration::from_micros(50));
        }
        mac.inner.cs_in(-60.0);
        assert!(prober.join().unwrap(), "-60 dBm is above the -80 threshold");
    }
}
