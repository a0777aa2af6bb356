//! In-memory transport for tests.
//!
//! [`MockTransport`] records every frame written to it and answers
//! `send_and_wait` from a queue of scripted acknowledgements. The paired
//! [`MockHandle`] stays with the test after the transport has been moved into
//! a [`crate::Device`].
//!
//! ```rust,ignore
//! let (transport, handle) = MockTransport::new();
//! handle.queue_reply(b"a 01 OK01x");
//! let mut device = Device::new(transport, protocol, options)?;
//! device.set("Power", &"On".into(), None).await?;
//! assert_eq!(handle.sent_frames(), vec!["ka 01 01\r"]);
//! ```

use crate::error::TransportError;
use crate::transport::Transport;
use async_trait::async_trait;
use parking_lot::Mutex;
use regex::bytes::Regex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct MockState {
    sent: Vec<Vec<u8>>,
    acks: VecDeque<Option<Vec<u8>>>,
    closed: bool,
}

#[derive(Debug)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

/// Test-side view of a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            Self {
                state: state.clone(),
            },
            MockHandle { state },
        )
    }
}

impl MockHandle {
    /// Frames written so far, decoded lossily as text.
    pub fn sent_frames(&self) -> Vec<String> {
        self.state
            .lock()
            .sent
            .iter()
            .map(|frame| String::from_utf8_lossy(frame).into_owned())
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.state.lock().sent.len()
    }

    /// Answer the next `send_and_wait` with `reply`.
    pub fn queue_reply(&self, reply: &[u8]) {
        self.state.lock().acks.push_back(Some(reply.to_vec()));
    }

    /// Let the next `send_and_wait` time out.
    pub fn queue_timeout(&self) {
        self.state.lock().acks.push_back(None);
    }

    /// Make every further write fail as if the link had dropped.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    pub fn clear(&self) {
        self.state.lock().sent.clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        state.sent.push(frame.to_vec());
        Ok(())
    }

    async fn send_and_wait(
        &mut self,
        frame: &[u8],
        _timeout: Duration,
        delimiter: &Regex,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        state.sent.push(frame.to_vec());

        // An empty queue behaves like a silent device.
        let reply = state.acks.pop_front().flatten();
        Ok(reply.and_then(|bytes| {
            delimiter
                .find(&bytes)
                .map(|m| bytes[..m.end()].to_vec())
        }))
    }
}
