//! Network primitives: endpoint addresses and the mio-backed UDP socket.

pub mod endpoint;
pub mod socket;

pub use endpoint::Endpoint;
pub use socket::UdpSocket;
