//! Delivery of compressed audio to the collector.
//!
//! ```text
//! pipeline → TransmitRing (fixed slots, drop-oldest on overflow)
//!          → StreamingTransport::service (one non-blocking write per pass)
//!          → Connection (TcpConnection on the host)
//! ```

pub mod request;
pub mod ring;
pub mod session;
pub mod tcp;
pub mod transport;

pub use request::CollectorRequest;
pub use ring::{FillAdvance, TransmitRing};
pub use session::SessionCounters;
pub use tcp::{TcpConnection, TcpNetwork};
pub use transport::{
    send_status, Connection, NetworkStack, SendOutcome, StreamingTransport, TransportError,
    WriteOutcome,
};
