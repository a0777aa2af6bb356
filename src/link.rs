//! Stream transports for displays.
//!
//! A display is reached either through a serial-over-Ethernet adapter (TCP)
//! or a local RS-232 port. Both are plain byte streams, so one transport type
//! covers them: [`StreamTransport`] owns the write half and a reader task
//! that forwards inbound chunks over a channel.
//!
//! Inbound bytes are consumed from two places:
//! - [`Transport::send_and_wait`] reads until its delimiter matches
//! - [`StreamTransport::recv`] hands everything else to the connection
//!   handler, which feeds it to the driver's response matcher
//!
//! Any type implementing `AsyncRead + AsyncWrite + Unpin + Send` can be
//! attached, which is how tests drive it with `tokio::io::duplex`.

use crate::config::{DisplayConfig, LinkKind};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use regex::bytes::Regex;
use room_core::{Transport, TransportError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Trait alias for async byte streams.
pub trait LinkIO: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> LinkIO for T {}

/// Type-erased boxed stream.
pub type DynLink = Box<dyn LinkIO>;

const READ_CHUNK: usize = 256;
const INBOUND_QUEUE: usize = 64;

/// Transport over an attachable byte stream.
///
/// While detached every write fails with [`TransportError::Closed`] and
/// [`recv`](Self::recv) never resolves.
#[derive(Default)]
pub struct StreamTransport {
    writer: Option<WriteHalf<DynLink>>,
    inbound: Option<mpsc::Receiver<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
    pending: Vec<u8>,
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("attached", &self.is_attached())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl StreamTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.writer.is_some()
    }

    /// Take ownership of `stream`, replacing any previous one.
    pub fn attach(&mut self, stream: DynLink) {
        self.detach();

        let (mut read_half, write_half) = tokio::io::split(stream);
        let (tx, rx) = mpsc::channel(INBOUND_QUEUE);

        let reader = tokio::spawn(async move {
            let mut buf = [0u8; READ_CHUNK];
            loop {
                match read_half.read(&mut buf).await {
                    Ok(0) => {
                        debug!("link closed by peer");
                        break;
                    }
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "link read failed");
                        break;
                    }
                }
            }
        });

        self.writer = Some(write_half);
        self.inbound = Some(rx);
        self.reader = Some(reader);
    }

    /// Drop the stream and anything buffered from it.
    pub fn detach(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.writer = None;
        self.inbound = None;
        self.pending.clear();
    }

    /// Next inbound chunk, or `None` once the peer has closed the link.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        if !self.pending.is_empty() {
            return Some(std::mem::take(&mut self.pending));
        }
        match self.inbound.as_mut() {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let writer = self.writer.as_mut().ok_or(TransportError::Closed)?;
        writer.write_all(frame).await?;
        writer.flush().await?;
        Ok(())
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

#[async_trait]
impl Transport for StreamTransport {
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.write_frame(frame).await
    }

    async fn send_and_wait(
        &mut self,
        frame: &[u8],
        timeout: Duration,
        delimiter: &Regex,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        self.write_frame(frame).await?;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(span) = delimiter.find(&self.pending).map(|m| m.range()) {
                // Bytes around the acknowledgement stay queued for `recv`.
                let reply: Vec<u8> = self.pending.drain(span).collect();
                trace!(reply = %String::from_utf8_lossy(&reply), "acknowledged");
                return Ok(Some(reply));
            }

            let rx = self.inbound.as_mut().ok_or(TransportError::Closed)?;
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(chunk)) => self.pending.extend_from_slice(&chunk),
                Ok(None) => return Err(TransportError::Closed),
                Err(_) => return Ok(None),
            }
        }
    }
}

/// Open the stream configured for `display`.
pub async fn open(display: &DisplayConfig) -> Result<DynLink> {
    match display.link {
        LinkKind::Tcp => {
            let host = display
                .host
                .as_deref()
                .ok_or_else(|| anyhow!("display '{}' has no host", display.id))?;
            let port = display
                .port
                .ok_or_else(|| anyhow!("display '{}' has no port", display.id))?;
            Ok(Box::new(open_tcp(host, port).await?))
        }
        LinkKind::Serial => {
            let path = display
                .serial_path
                .as_deref()
                .ok_or_else(|| anyhow!("display '{}' has no serial_path", display.id))?;
            open_serial(path, display.baud_rate, display.display_name()).await
        }
    }
}

/// Connect to a serial-over-Ethernet adapter or network control port.
pub async fn open_tcp(host: &str, port: u16) -> Result<tokio::net::TcpStream> {
    let stream = tokio::net::TcpStream::connect((host, port))
        .await
        .with_context(|| format!("Failed to connect to {}:{}", host, port))?;
    stream.set_nodelay(true).context("Failed to set TCP_NODELAY")?;
    Ok(stream)
}

/// Open a local serial port using spawn_blocking, 8N1 without flow control.
#[cfg(feature = "serial")]
pub async fn open_serial(port_path: &str, baud_rate: u32, device_name: &str) -> Result<DynLink> {
    use tokio::task::spawn_blocking;
    use tokio_serial::SerialPortBuilderExt;

    let port_path_owned = port_path.to_string();
    let device_name_owned = device_name.to_string();

    let port = spawn_blocking(move || {
        tokio_serial::new(&port_path_owned, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .context(format!(
                "Failed to open {} serial port: {}",
                device_name_owned, port_path_owned
            ))
    })
    .await
    .context("spawn_blocking for serial port opening failed")??;

    Ok(Box::new(port))
}

#[cfg(not(feature = "serial"))]
pub async fn open_serial(port_path: &str, _baud_rate: u32, device_name: &str) -> Result<DynLink> {
    Err(anyhow!(
        "{} is wired to {}, but serial support is not compiled in (enable the `serial` feature)",
        device_name,
        port_path
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn ack() -> Regex {
        Regex::new(r"[a-z] [0-9a-f]{2} (?:OK|NG).*?x").unwrap()
    }

    #[tokio::test]
    async fn detached_link_refuses_writes() {
        let mut link = StreamTransport::new();
        assert!(matches!(
            link.send(b"ka 01 FF\r").await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn send_and_wait_returns_acknowledgement_only() {
        let (mut peer, local) = tokio::io::duplex(256);
        let mut link = StreamTransport::new();
        link.attach(Box::new(local));

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 32];
            let n = peer.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"ka 01 01\r");
            peer.write_all(b"a 01 OK01xa 01 OK").await.unwrap();
            peer
        });

        let reply = link
            .send_and_wait(b"ka 01 01\r", Duration::from_secs(1), &ack())
            .await
            .unwrap();
        assert_eq!(reply.as_deref(), Some(&b"a 01 OK01x"[..]));

        let _peer = responder.await.unwrap();
        // The tail stays available to the inbound path.
        assert_eq!(link.recv().await.as_deref(), Some(&b"a 01 OK"[..]));
    }

    #[tokio::test]
    async fn bytes_before_acknowledgement_reach_inbound_path() {
        let (mut peer, local) = tokio::io::duplex(256);
        let mut link = StreamTransport::new();
        link.attach(Box::new(local));

        // Unrelated bytes arrive ahead of the acknowledgement.
        peer.write_all(b"f 01 NG\n").await.unwrap();
        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 32];
            let n = peer.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"ka 01 01\r");
            peer.write_all(b"a 01 OK01x").await.unwrap();
            peer
        });

        let reply = link
            .send_and_wait(b"ka 01 01\r", Duration::from_secs(1), &ack())
            .await
            .unwrap();
        assert_eq!(reply.as_deref(), Some(&b"a 01 OK01x"[..]));

        let _peer = responder.await.unwrap();
        assert_eq!(link.recv().await.as_deref(), Some(&b"f 01 NG\n"[..]));
    }

    #[tokio::test]
    async fn send_and_wait_times_out() {
        let (_peer, local) = tokio::io::duplex(256);
        let mut link = StreamTransport::new();
        link.attach(Box::new(local));

        let reply = link
            .send_and_wait(b"ka 01 01\r", Duration::from_millis(20), &ack())
            .await
            .unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn peer_close_ends_inbound() {
        let (peer, local) = tokio::io::duplex(256);
        let mut link = StreamTransport::new();
        link.attach(Box::new(local));
        drop(peer);
        assert_eq!(link.recv().await, None);
    }
}
