//! Named input and output ports.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

use crate::message::Message;

/// A message tagged with the input port it was posted to.
pub type Envelope = (String, Message);

/// Handle to a named input port of some block.
///
/// Cloning is cheap; every clone feeds the same mailbox. Posting never
/// blocks, and a message posted to a block whose dispatcher has exited is
/// silently discarded.
#[derive(Debug, Clone)]
pub struct InPort {
    name: String,
    tx: Sender<Envelope>,
}

impl InPort {
    pub(crate) fn new(name: String, tx: Sender<Envelope>) -> Self {
        Self { name, tx }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deliver a message to this port.
    pub fn post(&self, msg: Message) {
        let _ = self.tx.send((self.name.clone(), msg));
    }
}

/// Fan-out side of a named output port.
///
/// Cloning shares the subscriber list, so a block can hand out handles
/// while keeping one for publishing.
#[derive(Debug, Clone, Default)]
pub struct OutPort {
    subs: Arc<Mutex<Vec<InPort>>>,
}

impl OutPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a destination input port.
    pub fn connect(&self, dst: &InPort) {
        self.subs.lock().expect("port list poisoned").push(dst.clone());
    }

    /// Publish a message to every subscriber, in subscription order.
    pub fn publish(&self, msg: Message) {
        let subs = self.subs.lock().expect("port list poisoned");
        for sub in subs.iter() {
            sub.post(msg.clone());
        }
    }

    pub fn is_connected(&self) -> bool {
        !self.subs.lock().expect("port list poisoned").is_empty()
    }
}

/// Connect an output port to an input port.
pub fn connect(src: &OutPort, dst: &InPort) {
    src.connect(dst)
}

/// A free-standing input port together with the receiving end of its queue.
///
/// Stands in for an external collaborator (modem, application, test
/// harness) that wants to observe what a block publishes.
pub fn probe(name: &str) -> (InPort, Receiver<Envelope>) {
    let (tx, rx) = channel();
    (InPort::new(name.to_string(), tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_fans_out_to_all_subscribers() {
        let out = OutPort::new();
        let (a, rx_a) = probe("a");
        let (b, rx_b) = probe("b");
        connect(&out, &a);
        connect(&out, &b);

        out.publish(Message::symbol("hello"));

        let (port, msg) = rx_a.recv().unwrap();
        assert_eq!(port, "a");
        assert_eq!(msg.as_symbol(), Some("hello"));
        let (port, msg) = rx_b.recv().unwrap();
        assert_eq!(port, "b");
        assert_eq!(msg.as_symbol(), Some("hello"));
    }

    #[test]
    fn unconnected_publish_is_a_noop() {
        let out = OutPort::new();
        assert!(!out.is_connected());
        out.publish(Message::Float(1.0));
    }

    #[test]
    fn post_after_receiver_drop_is_discarded() {
        let (port, rx) = probe("gone");
        drop(rx);
        port.post(Message::symbol("into the void"));
    }
}
