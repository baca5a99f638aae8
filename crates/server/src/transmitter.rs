//! Puts session replies on the wire.

use std::net::SocketAddr;

use ferry_protocol::{Frame, Framing, ServerMessage};
use tokio::net::UdpSocket;
use tracing::trace;

use crate::ServerError;
use crate::session::Outgoing;

/// Sends control messages and chunk frames to one peer.
///
/// Datagrams go out in call order; the split-mode header/payload pair of a
/// frame is always sent back to back.
pub struct Transmitter<'a> {
    socket: &'a UdpSocket,
    peer: SocketAddr,
    framing: Framing,
}

impl<'a> Transmitter<'a> {
    pub fn new(socket: &'a UdpSocket, peer: SocketAddr, framing: Framing) -> Self {
        Self {
            socket,
            peer,
            framing,
        }
    }

    pub async fn send_control(&self, message: &ServerMessage) -> Result<usize, ServerError> {
        let datagram = message.encode()?;
        self.socket.send_to(&datagram, self.peer).await?;
        Ok(1)
    }

    pub async fn send_frame(&self, frame: &Frame) -> Result<usize, ServerError> {
        let datagrams = frame.encode(self.framing)?;
        for datagram in &datagrams {
            self.socket.send_to(datagram, self.peer).await?;
        }
        trace!(peer = %self.peer, header = ?frame.header, "frame sent");
        Ok(datagrams.len())
    }

    /// Sends everything in order. Returns the number of datagrams sent.
    pub async fn send_all(&self, outgoing: &[Outgoing]) -> Result<usize, ServerError> {
        let mut sent = 0;
        for item in outgoing {
            sent += match item {
                Outgoing::Control(message) => self.send_control(message).await?,
                Outgoing::Frame(frame) => self.send_frame(frame).await?,
            };
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_protocol::{FrameHeader, Payload};

    async fn pair() -> (UdpSocket, UdpSocket) {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        (server, client)
    }

    async fn recv(socket: &UdpSocket) -> Vec<u8> {
        let mut buf = vec![0u8; 2048];
        let (n, _) = socket.recv_from(&mut buf).await.unwrap();
        buf.truncate(n);
        buf
    }

    #[tokio::test]
    async fn split_frames_follow_the_control_message() {
        let (server, client) = pair().await;
        let tx = Transmitter::new(&server, client.local_addr().unwrap(), Framing::Split);

        let sent = tx
            .send_all(&[
                Outgoing::Control(ServerMessage::Digest("ab".into())),
                Outgoing::Frame(Frame::chunk(0, Payload::Data(b"AABB".to_vec()))),
                Outgoing::Frame(Frame::chunk(1, Payload::EndMarker)),
            ])
            .await
            .unwrap();
        assert_eq!(sent, 5);

        assert_eq!(recv(&client).await, br#"{"digest":"ab"}"#);
        assert_eq!(recv(&client).await, b"0");
        assert_eq!(recv(&client).await, b"AABB");
        assert_eq!(recv(&client).await, b"1");
        assert_eq!(recv(&client).await, b"EOF");
    }

    #[tokio::test]
    async fn framed_mode_sends_one_datagram_per_frame() {
        let (server, client) = pair().await;
        let tx = Transmitter::new(&server, client.local_addr().unwrap(), Framing::Framed);

        let sent = tx.send_frame(&Frame::finished()).await.unwrap();
        assert_eq!(sent, 1);

        let frame = Frame::decode_framed(&recv(&client).await).unwrap();
        assert_eq!(frame.header, FrameHeader::Finished);
    }

    #[tokio::test]
    async fn not_found_is_plain_text() {
        let (server, client) = pair().await;
        let tx = Transmitter::new(&server, client.local_addr().unwrap(), Framing::Split);
        tx.send_control(&ServerMessage::FileNotFound).await.unwrap();
        assert_eq!(recv(&client).await, b"File does not exist");
    }
}
