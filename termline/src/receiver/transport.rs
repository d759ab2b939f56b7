//! Outbound datagram transport used by the dispatcher.

use std::io;
use std::sync::Arc;

use crate::net::{Endpoint, UdpSocket};

/// Sends datagrams on behalf of a destination.
pub trait Transport {
    /// Sends `buf` as one datagram to `dest`, returning the bytes written.
    ///
    /// # Errors
    ///
    /// Any I/O failure; callers do not retry.
    fn send_to(&self, buf: &[u8], dest: Endpoint) -> io::Result<usize>;

    /// Releases the transport. Called exactly once, when the destination closes.
    fn close(self)
    where
        Self: Sized,
    {
    }
}

impl Transport for UdpSocket {
    fn send_to(&self, buf: &[u8], dest: Endpoint) -> io::Result<usize> {
        Self::send_to(self, buf, dest)
    }
}

/// The RX thread keeps its own clone for receiving; closing drops this one.
impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send_to(&self, buf: &[u8], dest: Endpoint) -> io::Result<usize> {
        (**self).send_to(buf, dest)
    }
}
