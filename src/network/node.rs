use dashmap::DashMap;
use log::{info, warn};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use std::sync::Arc;

use super::message::PeerMessage;

/// Errors that can occur in the peer transport
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Peer I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed peer message: {0}")]
    Codec(#[from] serde_json::Error),
}

/// A gossip node: listens for peers, answers handshakes with its own
/// advertised address and keeps a registry of every address it has heard
/// about. Fire and forget; there is no acknowledgment protocol.
#[derive(Debug, Clone)]
pub struct Node {
    public_address: String,
    peers: Arc<DashMap<String, ()>>,
}

impl Node {
    pub fn new(public_address: String) -> Self {
        Node {
            public_address,
            peers: Arc::new(DashMap::new()),
        }
    }

    /// The address this node advertises in handshakes
    pub fn public_address(&self) -> &str {
        &self.public_address
    }

    /// Every peer address this node has heard about
    pub fn peers(&self) -> Vec<String> {
        self.peers.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Binds the listener, dials the seed peers once and serves incoming
    /// connections until the process exits.
    pub async fn start(&self, port: u16, seeds: Vec<String>) -> Result<(), NodeError> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        info!("listening for peers on port {}", port);

        for seed in seeds {
            self.peers.insert(seed.clone(), ());
            if let Err(err) = self.connect(&seed).await {
                warn!("could not reach seed peer {}: {}", seed, err);
            }
        }

        self.listen(listener).await
    }

    /// Accept loop over an already-bound listener
    pub async fn listen(&self, listener: TcpListener) -> Result<(), NodeError> {
        loop {
            let (stream, remote) = listener.accept().await?;
            let node = self.clone();

            tokio::spawn(async move {
                if let Err(err) = node.serve(stream).await {
                    warn!("connection from {} failed: {}", remote, err);
                }
            });
        }
    }

    /// Reads newline-delimited JSON envelopes from one peer connection
    async fn serve(&self, stream: TcpStream) -> Result<(), NodeError> {
        let mut lines = BufReader::new(stream).lines();

        while let Some(line) = lines.next_line().await? {
            match serde_json::from_str::<PeerMessage>(&line) {
                Ok(message) => self.handle(message).await,
                Err(err) => warn!("discarding malformed peer message: {}", err),
            }
        }

        Ok(())
    }

    async fn handle(&self, message: PeerMessage) {
        match message {
            PeerMessage::Handshake(addresses) => {
                for address in addresses {
                    if address == self.public_address {
                        continue;
                    }

                    self.peers.insert(address.clone(), ());
                    if let Err(err) = self.connect(&address).await {
                        warn!("handshake with {} failed: {}", address, err);
                    }
                }
            }
        }
    }

    /// Dials `address` and introduces this node with a handshake carrying
    /// its own advertised address.
    pub async fn connect(&self, address: &str) -> Result<(), NodeError> {
        let mut stream = TcpStream::connect(address).await?;

        let message = PeerMessage::Handshake(vec![self.public_address.clone()]);
        let mut payload = serde_json::to_vec(&message)?;
        payload.push(b'\n');

        stream.write_all(&payload).await?;
        info!("sent handshake to {}", address);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_handshake_registers_and_answers() {
        tokio::time::timeout(Duration::from_secs(5), async {
            // A "remote" peer with its own listener.
            let peer_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let peer_address = peer_listener.local_addr().unwrap().to_string();

            // The node under test.
            let node_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let node_address = node_listener.local_addr().unwrap().to_string();
            let node = Node::new(node_address.clone());
            let accept_node = node.clone();
            tokio::spawn(async move {
                let _ = accept_node.listen(node_listener).await;
            });

            // The peer introduces itself.
            let mut stream = TcpStream::connect(&node_address).await.unwrap();
            let mut payload =
                serde_json::to_vec(&PeerMessage::Handshake(vec![peer_address.clone()])).unwrap();
            payload.push(b'\n');
            stream.write_all(&payload).await.unwrap();

            // The node dials back with its own advertised address.
            let (reply, _) = peer_listener.accept().await.unwrap();
            let mut lines = BufReader::new(reply).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            let message: PeerMessage = serde_json::from_str(&line).unwrap();

            assert_eq!(message, PeerMessage::Handshake(vec![node_address]));
            assert!(node.peers().contains(&peer_address));
        })
        .await
        .expect("handshake round-trip timed out");
    }

    #[tokio::test]
    async fn test_own_address_is_not_dialed() {
        let node = Node::new("127.0.0.1:9".to_string());

        node.handle(PeerMessage::Handshake(vec!["127.0.0.1:9".to_string()]))
            .await;

        assert!(node.peers().is_empty());
    }
}
