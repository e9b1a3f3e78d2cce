//! Message-port fabric for MAC-layer blocks
//!
//! Models each block as an actor with named input and output ports carrying
//! typed messages. Input ports feed a per-block mailbox drained by a single
//! dispatcher thread; output ports fan a message out to every connected
//! input. Delivery is asynchronous and unbounded: publishing never blocks
//! and never applies backpressure.

pub mod block;
pub mod message;
pub mod port;

pub use block::{Handler, Mailbox};
pub use message::{Frame, Message, Meta};
pub use port::{connect, probe, Envelope, InPort, OutPort};
