//! Raw frame transports
//!
//! This module provides the frame-level buses the ECUs talk over:
//! - [`VirtualCanBus`] - in-process broadcast bus for tests and local labs
//! - [`ProxyBus`] - splits sending and receiving across two transports
//! - `SocketCanTransport` - Linux SocketCAN (requires the `socketcan` feature)
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use doggie_core::{CanFrame, CanTransport, VirtualCanBus};
//!
//! # tokio_test_block_on(async {
//! let bus = VirtualCanBus::new("vcan0");
//! let a = bus.open("a");
//! let b = bus.open("b");
//! a.send(&CanFrame::new(0x600, vec![]).unwrap()).await.unwrap();
//! let frame = b.recv(Duration::from_millis(100)).await.unwrap();
//! assert_eq!(frame.map(|f| f.id()), Some(0x600));
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

pub mod error;
mod proxy;
mod vcan;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
mod socketcan;

pub use error::TransportError;
pub use proxy::ProxyBus;
pub use vcan::{VirtualCanBus, VirtualCanInterface};

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub use self::socketcan::SocketCanTransport;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::frame::CanFrame;

/// A bus that can send and receive raw frames
///
/// Implementations must be safe to share between tasks. Sends from
/// concurrent callers may interleave at frame granularity only.
#[async_trait]
pub trait CanTransport: Send + Sync {
    /// Put one frame on the bus
    async fn send(&self, frame: &CanFrame) -> Result<(), TransportError>;

    /// Wait up to `timeout` for the next frame
    ///
    /// Returns `Ok(None)` when the timeout elapses with nothing received.
    async fn recv(&self, timeout: Duration) -> Result<Option<CanFrame>, TransportError>;
}

/// Shared handle to a transport
pub type SharedBus = Arc<dyn CanTransport>;

/// Open a SocketCAN interface as a shared transport
#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub fn open_socketcan(interface: &str) -> Result<SharedBus, TransportError> {
    Ok(Arc::new(SocketCanTransport::open(interface)?))
}

/// Open a SocketCAN interface as a shared transport
#[cfg(not(all(target_os = "linux", feature = "socketcan")))]
pub fn open_socketcan(interface: &str) -> Result<SharedBus, TransportError> {
    Err(TransportError::Unsupported(format!(
        "SocketCAN interface '{}' requires Linux and the 'socketcan' feature",
        interface
    )))
}
