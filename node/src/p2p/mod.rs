pub mod pool;
pub mod protocol;
pub mod transport;

pub use pool::PeerPool;
pub use transport::PeerTransport;
