//! Carrier sense block
//!
//! Streaming energy detector over complex baseband samples. A control
//! message arms a single measurement window; while the window runs, every
//! sample's power is folded into a running maximum, and when the window
//! elapses the block publishes that maximum so the requester can decide
//! whether the medium is busy.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use anyhow::Result;
use log::debug;
use num_complex::Complex32;

use fabric::{Handler, InPort, Mailbox, Message, OutPort};

use crate::timing;

/// Samples folded per power block between clock checks.
const BLOCK: usize = 8;
/// Sentinel below any real measurement.
const POWER_FLOOR: f32 = -10_000.0;

/// Carrier sense configuration.
#[derive(Debug, Clone)]
pub struct CarrierConfig {
    /// Normalization divisor applied to sample magnitudes.
    pub num_samples: u32,
    /// Receive gain to subtract from the measured power, in dB.
    pub gain: f32,
    pub debug: bool,
}

impl Default for CarrierConfig {
    fn default() -> Self {
        Self {
            num_samples: 1,
            gain: 0.0,
            debug: false,
        }
    }
}

/// The carrier sense block.
///
/// The message side runs on the dispatcher thread; [`CarrierSense::work`]
/// is the stream input and is called from the radio driver thread.
pub struct CarrierSense {
    inner: Arc<Inner>,
    mailbox: Mailbox,
    dispatcher: Option<JoinHandle<()>>,
}

struct Inner {
    cfg: CarrierConfig,
    state: Mutex<SenseState>,
    out_csense: OutPort,
}

struct SenseState {
    active: bool,
    window_us: f32,
    threshold: f32,
    started: Instant,
    max_power: f32,
}

impl CarrierSense {
    pub fn new(cfg: CarrierConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                cfg,
                state: Mutex::new(SenseState {
                    active: false,
                    window_us: 0.0,
                    threshold: POWER_FLOOR,
                    started: Instant::now(),
                    max_power: POWER_FLOOR,
                }),
                out_csense: OutPort::new(),
            }),
            mailbox: Mailbox::new(),
            dispatcher: None,
        }
    }

    /// Measurement requests: `"threshold=X,time=Y"` or a bare `"<us>"`.
    pub fn in_control(&self) -> InPort {
        self.mailbox.in_port("in control")
    }

    /// One `Message::Float` per completed window: the maximum observed
    /// per-sample power in dBm.
    pub fn out_csense(&self) -> &OutPort {
        &self.inner.out_csense
    }

    /// Whether a measurement window is currently running.
    pub fn is_sensing(&self) -> bool {
        self.inner.lock().active
    }

    pub fn start(&mut self) -> Result<()> {
        self.dispatcher = Some(self.mailbox.spawn("carrier-sense", self.inner.clone())?);
        Ok(())
    }

    /// Stream input: consume one chunk of baseband samples.
    ///
    /// Does nothing unless a measurement window is active.
    pub fn work(&self, samples: &[Complex32]) {
        self.inner.work(samples)
    }
}

impl Drop for CarrierSense {
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
            ("in control", Message::Symbol(request)) => self.arm(&request),
            (port, msg) => debug!("carrier sense: unexpected message on {port}: {msg:?}"),
        }
    }
}

impl Inner {
    fn lock(&self) -> std::sync::MutexGuard<'_, SenseState> {
        self.state.lock().expect("carrier sense state poisoned")
    }

    /// Arm one measurement window. Requests arriving while a window is
    /// already running are dropped.
    fn arm(&self, request: &str) {
        let mut state = self.lock();
        if state.active {
            return;
        }
        let Some((threshold, window_us)) = parse_request(request) else {
            debug!("carrier sense: malformed request {request:?}");
            return;
        };
        if let Some(threshold) = threshold {
            state.threshold = threshold;
        }
        state.window_us = window_us;
        state.max_power = POWER_FLOOR;
        state.started = Instant::now();
        state.active = true;
        if self.cfg.debug {
            debug!("carrier sense: window armed for {window_us} us");
        }
    }

    fn work(&self, samples: &[Complex32]) {
        let mut state = self.lock();
        if !state.active || samples.is_empty() {
            return;
        }

        let divisor = self.cfg.num_samples as f32;
        let mut duration = timing::elapsed_us(state.started) as f32;
        let mut block_us = 0.0;
        let mut i = 0;

        while i < samples.len() {
            let block_start = Instant::now();
            let mut j = 0;
            while j < BLOCK && i < samples.len() {
                let power = 20.0 * (samples[i].norm() / divisor).log10() + 10.0 - self.cfg.gain;
                if power >= state.max_power {
                    state.max_power = power;
                }
                i += 1;
                j += 1;
            }
            duration = timing::elapsed_us(state.started) as f32;
            block_us = timing::elapsed_us(block_start) as f32;

            if state.window_us - duration <= block_us || duration >= state.window_us {
                break;
            }
        }

        // Window is over when the time left is less than one block.
        if state.window_us - duration <= block_us || duration >= state.window_us {
            state.active = false;
            let power = state.max_power;
            if self.cfg.debug {
                let medium = if power >= state.threshold { "busy" } else { "idle" };
                debug!(
                    "carrier sense: window done after {duration} us, max power {power:.1} dBm ({medium})"
                );
            }
            drop(state);
            self.out_csense.publish(Message::Float(power));
        }
    }
}

/// Parse a measurement request: the legacy `"threshold=X,time=Y"` form or
/// a bare microsecond count.
fn parse_request(request: &str) -> Option<(Option<f32>, f32)> {
    if let Some(rest) = request.strip_prefix("threshold=") {
        let (threshold, time) = rest.split_once(",time=")?;
        Some((
            Some(threshold.trim().parse().ok()?),
            time.trim().parse().ok()?,
        ))
    } else {
        Some((None, request.trim().parse().ok()?))
    }
}
