//! Per-block mailbox and dispatcher thread.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{Builder, JoinHandle};

use anyhow::{Context, Result};
use log::trace;

use crate::message::Message;
use crate::port::{Envelope, InPort};

/// Reserved port name used to wake and stop a dispatcher.
const HALT_PORT: &str = "system halt";

/// Message handler invoked on a block's dispatcher thread.
///
/// Handlers for one block run strictly sequentially, so a handler may block
/// (the TDMA SYNC response does) and later messages simply queue up behind
/// it.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, port: &str, msg: Message);
}

/// Multiplexes every input port of a block into one queue.
pub struct Mailbox {
    tx: Sender<Envelope>,
    rx: Option<Receiver<Envelope>>,
}

impl Mailbox {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Self { tx, rx: Some(rx) }
    }

    /// Create a named input port feeding this mailbox.
    pub fn in_port(&self, name: &str) -> InPort {
        InPort::new(name.to_string(), self.tx.clone())
    }

    /// Move the receiver into a named dispatcher thread.
    ///
    /// The dispatcher calls `handler.handle` for each queued message until
    /// the halt token arrives or every port handle has been dropped. Can be
    /// called once per mailbox.
    pub fn spawn<H: Handler>(&mut self, name: &str, handler: Arc<H>) -> Result<JoinHandle<()>> {
        let rx = self.rx.take().context("dispatcher already running")?;
        let thread_name = name.to_string();
        let handle = Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                while let Ok((port, msg)) = rx.recv() {
                    if port == HALT_PORT {
                        break;
                    }
                    handler.handle(&port, msg);
                }
                trace!("{thread_name}: dispatcher exiting");
            })
            .with_context(|| format!("spawning dispatcher {name}"))?;
        Ok(handle)
    }

    /// Wake the dispatcher and make it exit. Messages queued ahead of the
    /// halt token are still handled.
    pub fn halt(&self) {
        let _ = self.tx.send((HALT_PORT.to_string(), Message::Symbol(String::new())));
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}
