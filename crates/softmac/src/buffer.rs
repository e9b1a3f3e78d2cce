//! Frame buffer block
//!
//! Bounded FIFO between the upper layer and whichever MAC is active.
//! Ingest can rewrite the frame's destination MAC from the host ARP table;
//! output is demand-driven, one frame per `"get frame"` request on the
//! currently selected port. Broadcast and metrics frames jump the queue.

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use anyhow::Result;
use log::{debug, warn};

use fabric::{Frame, Handler, InPort, Mailbox, Message, Meta, OutPort};

use crate::arp::{ArpTable, ARP_CACHE};
use crate::frame::FCS_LEN;

/// Number of request/output port pairs (one per attachable MAC).
pub const NUM_PORTS: usize = 3;

/// Byte offset of the destination MAC inside the frame (addr1).
const DST_OFFSET: usize = 4;
/// Byte offset of the IPv4 destination inside the encapsulated packet.
const IP_OFFSET: usize = 48;

/// Frame buffer configuration.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Queue capacity in frames.
    pub capacity: usize,
    /// Rewrite destination MACs from the ARP table on ingest.
    pub arp: bool,
    /// ARP cache location; tests point this at a fixture file.
    pub arp_cache: PathBuf,
    /// Initially selected output port; −1 means no MAC selected.
    pub port_id: i8,
    pub debug: bool,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            arp: false,
            arp_cache: PathBuf::from(ARP_CACHE),
            port_id: -1,
            debug: false,
        }
    }
}

/// The frame buffer block.
///
/// Connect `frame_out(K)` to MAC K's buffer input and MAC K's request
/// output to `req_in(K)`, then call [`FrameBuffer::start`].
pub struct FrameBuffer {
    inner: Arc<Inner>,
    mailbox: Mailbox,
    dispatcher: Option<JoinHandle<()>>,
}

struct Inner {
    cfg: BufferConfig,
    state: Mutex<State>,
    frame_out: [OutPort; NUM_PORTS],
}

struct State {
    queue: VecDeque<Frame>,
    port_id: i8,
}

impl FrameBuffer {
    pub fn new(cfg: BufferConfig) -> Self {
        let state = Mutex::new(State {
            queue: VecDeque::with_capacity(cfg.capacity),
            port_id: cfg.port_id,
        });
        Self {
            inner: Arc::new(Inner {
                cfg,
                state,
                frame_out: std::array::from_fn(|_| OutPort::new()),
            }),
            mailbox: Mailbox::new(),
            dispatcher: None,
        }
    }

    /// Frames arriving from the application.
    pub fn app_in(&self) -> InPort {
        self.mailbox.in_port("app in")
    }

    /// Port selection control (`"portid-1"` … `"portid2"`).
    pub fn ctrl_in(&self) -> InPort {
        self.mailbox.in_port("ctrl in")
    }

    /// Demand port for MAC `id` (`"get frame"` requests).
    pub fn req_in(&self, id: usize) -> InPort {
        self.mailbox.in_port(&format!("req in {id}"))
    }

    /// Broadcast frames that must jump the queue.
    pub fn broad_in(&self) -> InPort {
        self.mailbox.in_port("broad in")
    }

    /// Metrics frames that must jump the queue.
    pub fn metrics_in(&self) -> InPort {
        self.mailbox.in_port("metrics in")
    }

    /// Output toward MAC `id`.
    pub fn frame_out(&self, id: usize) -> &OutPort {
        &self.inner.frame_out[id]
    }

    /// Number of frames currently queued.
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start the dispatcher thread.
    pub fn start(&mut self) -> Result<()> {
        self.dispatcher = Some(self.mailbox.spawn("frame-buffer", self.inner.clone())?);
        Ok(())
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        self.mailbox.halt();
        if let Some(thread) = self.dispatcher.take() {
            let _ = thread.join();
        }
    }
}

impl Handler for Inner {
    fn handle(&self, port: &str, msg: Message) {
        match (port, msg) {
            ("app in", Message::Frame(frame)) => self.enqueue(frame),
            ("ctrl in", Message::Symbol(token)) => self.select_port(&token),
            ("broad in", Message::Frame(frame)) | ("metrics in", Message::Frame(frame)) => {
                self.bypass(frame)
            }
            (port, Message::Symbol(token)) if port.starts_with("req in ") => {
                if let Ok(id) = port["req in ".len()..].parse::<usize>() {
                    self.request(id, &token);
                }
            }
            (port, msg) => debug!("frame buffer: unexpected message on {port}: {msg:?}"),
        }
    }
}

impl Inner {
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("frame buffer state poisoned")
    }

    fn enqueue(&self, frame: Frame) {
        let frame = if self.cfg.arp {
            self.rewrite_dest(frame)
        } else {
            frame
        };

        let mut state = self.lock();
        if state.queue.len() >= self.cfg.capacity {
            warn!("frame buffer full, evicting oldest frame");
            state.queue.pop_front();
        }
        state.queue.push_back(frame);
    }

    /// Push to the front of the queue; used by the bypass ports.
    fn bypass(&self, frame: Frame) {
        let mut state = self.lock();
        if state.queue.len() >= self.cfg.capacity {
            warn!("frame buffer full, evicting newest frame for bypass");
            state.queue.pop_back();
        }
        state.queue.push_front(frame);
    }

    fn select_port(&self, token: &str) {
        let id = match token {
            "portid-1" => -1,
            "portid0" => 0,
            "portid1" => 1,
            "portid2" => 2,
            _ => return,
        };
        self.lock().port_id = id;
        if self.cfg.debug {
            debug!("frame buffer: selected port {id}");
        }
    }

    fn request(&self, id: usize, token: &str) {
        if token != "get frame" || id >= NUM_PORTS {
            return;
        }
        let mut state = self.lock();
        if state.port_id != id as i8 {
            return;
        }
        if let Some(frame) = state.queue.pop_front() {
            let queued = state.queue.len();
            drop(state);
            self.frame_out[id].publish(Message::Frame(frame));
            if self.cfg.debug {
                debug!("frame buffer: frame sent on port {id}, {queued} queued");
            }
        }
    }

    /// Rewrite the destination MAC from the ARP table and refresh the CRC
    /// trailer. Any miss falls through with the frame unchanged.
    fn rewrite_dest(&self, frame: Frame) -> Frame {
        if frame.data.len() < IP_OFFSET + 4 {
            if self.cfg.debug {
                debug!("frame buffer: frame too short for ARP rewrite");
            }
            return frame;
        }

        let ip = {
            let d = &frame.data[IP_OFFSET..IP_OFFSET + 4];
            Ipv4Addr::new(d[0], d[1], d[2], d[3])
        };
        let table = match ArpTable::load(&self.cfg.arp_cache) {
            Ok(table) => table,
            Err(err) => {
                warn!("frame buffer: ARP cache unavailable: {err:#}");
                return frame;
            }
        };
        let mac = match table.lookup(ip) {
            Some(mac) => mac,
            None => {
                if self.cfg.debug {
                    debug!("frame buffer: unknown destination MAC for {ip}");
                }
                return frame;
            }
        };

        let mut data = frame.data;
        data[DST_OFFSET..DST_OFFSET + 6].copy_from_slice(mac.as_bytes());
        let body_len = data.len() - FCS_LEN;
        let fcs = base::crc::crc32(&data[..body_len]).to_le_bytes();
        data[body_len..].copy_from_slice(&fcs);
        if self.cfg.debug {
            debug!("frame buffer: destination rewritten to {mac}");
        }
        Frame {
            meta: Meta { crc_included: true },
            data,
        }
    }
}
