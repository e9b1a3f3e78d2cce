//! Port selector switch
//!
//! Stateless N-way multiplexer: a message arriving on input `inK` is
//! forwarded to output `outK` iff K is the selected port, otherwise it is
//! dropped. A `"portidK"` control token changes the selection; `-1`
//! disables all forwarding. Used to route exactly one MAC to the modem.

use std::sync::atomic::{AtomicI8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::Result;
use log::debug;

use fabric::{Handler, InPort, Mailbox, Message, OutPort};

/// The switch block.
pub struct Switch {
    inner: Arc<Inner>,
    mailbox: Mailbox,
    dispatcher: Option<JoinHandle<()>>,
}

struct Inner {
    num_ports: usize,
    selected: AtomicI8,
    outputs: Vec<OutPort>,
}

impl Switch {
    /// A switch with `num_ports` input/output pairs, initially selecting
    /// `port_id` (−1 = drop everything).
    pub fn new(num_ports: usize, port_id: i8) -> Self {
        Self {
            inner: Arc::new(Inner {
                num_ports,
                selected: AtomicI8::new(port_id),
                outputs: (0..num_ports).map(|_| OutPort::new()).collect(),
            }),
            mailbox: Mailbox::new(),
            dispatcher: None,
        }
    }

    /// Selection control (`"portid-1"` … `"portid{N-1}"`).
    pub fn ctrl_in(&self) -> InPort {
        self.mailbox.in_port("ctrl in")
    }

    /// Input `inK`.
    pub fn input(&self, id: usize) -> InPort {
        self.mailbox.in_port(&format!("in{id}"))
    }

    /// Output `outK`.
    pub fn output(&self, id: usize) -> &OutPort {
        &self.inner.outputs[id]
    }

    /// Currently selected port.
    pub fn selected(&self) -> i8 {
        self.inner.selected.load(Ordering::Acquire)
    }

    pub fn start(&mut self) -> Result<()> {
        self.dispatcher = Some(self.mailbox.spawn("switch", self.inner.clone())?);
        Ok(())
    }
}

impl Drop for Switch {
    fn drop(&mut self) {
        self.mailbox.halt();
        if let Some(thread) = self.dispatcher.take() {
            let _ = thread.join();
        }
    }
}

impl Handler for Inner {
    fn handle(&self, port: &str, msg: Message) {
        if port == "ctrl in" {
            if let Message::Symbol(token) = msg {
                self.select(&token);
            }
            return;
        }
        let Some(id) = port.strip_prefix("in").and_then(|p| p.parse::<usize>().ok()) else {
            debug!("switch: unexpected message on {port}");
            return;
        };
        if id < self.num_ports && self.selected.load(Ordering::Acquire) == id as i8 {
            self.outputs[id].publish(msg);
        }
    }
}

impl Inner {
    fn select(&self, token: &str) {
        let Some(id) = token.strip_prefix("portid").and_then(|p| p.parse::<i8>().ok()) else {
            return;
        };
        if id < -1 || id as i64 >= self.num_ports as i64 {
            return;
        }
        self.selected.store(id, Ordering::Release);
    }
}
