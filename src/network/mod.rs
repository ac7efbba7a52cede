// Network module
//
// The peer-to-peer transport: a JSON message envelope exchanged over TCP
// and the node that listens for peers, answers handshakes and keeps a
// registry of known addresses.

pub mod message;
pub mod node;

// Re-export main components for easier access
pub use message::PeerMessage;
pub use node::{Node, NodeError};
