//! Transport contract consumed by the driver.
//!
//! The driver never owns a socket. It writes frames through a [`Transport`]
//! and is handed inbound chunks by whoever owns the read side (see
//! [`crate::Device::receive`]). Any type implementing the trait works:
//!
//! - a TCP serial-over-Ethernet adapter
//! - a local RS-232 port
//! - [`crate::mock::MockTransport`] in tests

use crate::error::TransportError;
use async_trait::async_trait;
use regex::bytes::Regex;
use std::time::Duration;

#[async_trait]
pub trait Transport: Send {
    /// Write one frame. Does not wait for a reply.
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Write one frame and wait up to `timeout` for inbound bytes matching
    /// `delimiter`.
    ///
    /// Returns the bytes up to and including the match, or `Ok(None)` when
    /// nothing matched in time. Bytes consumed here are not delivered to the
    /// inbound chunk path.
    async fn send_and_wait(
        &mut self,
        frame: &[u8],
        timeout: Duration,
        delimiter: &Regex,
    ) -> Result<Option<Vec<u8>>, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        (**self).send(frame).await
    }

    async fn send_and_wait(
        &mut self,
        frame: &[u8],
        timeout: Duration,
        delimiter: &Regex,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        (**self).send_and_wait(frame, timeout, delimiter).await
    }
}
