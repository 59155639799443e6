//! SocketCAN transport (Linux only)

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use socketcan::{CanSocket, EmbeddedFrame, Socket, StandardId};
use tracing::{debug, trace};

use super::{CanTransport, TransportError};
use crate::frame::CanFrame;

/// Raw CAN socket bound to one interface (e.g. `vcan0`, `can0`)
pub struct SocketCanTransport {
    interface: String,
    socket: Arc<CanSocket>,
}

impl SocketCanTransport {
    pub fn open(interface: &str) -> Result<Self, TransportError> {
        let socket = CanSocket::open(interface).map_err(|e| {
            TransportError::ConnectionFailed(format!(
                "Failed to open raw CAN socket on {}: {}",
                interface, e
            ))
        })?;

        debug!(interface, "SocketCAN interface opened");

        Ok(Self {
            interface: interface.to_string(),
            socket: Arc::new(socket),
        })
    }
}

#[async_trait]
impl CanTransport for SocketCanTransport {
    async fn send(&self, frame: &CanFrame) -> Result<(), TransportError> {
        let id = StandardId::new(frame.id()).ok_or_else(|| {
            TransportError::SendFailed(format!("Invalid standard id 0x{:X}", frame.id()))
        })?;
        let raw = socketcan::CanFrame::new(id, frame.data()).ok_or_else(|| {
            TransportError::SendFailed(format!("Cannot build frame {}", frame))
        })?;

        let socket = self.socket.clone();
        tokio::task::spawn_blocking(move || socket.write_frame(&raw))
            .await
            .map_err(|e| TransportError::SendFailed(format!("Send task join error: {}", e)))?
            .map_err(|e| {
                TransportError::SendFailed(format!("write on {} failed: {}", self.interface, e))
            })?;

        trace!(interface = %self.interface, %frame, "socketcan tx");
        Ok(())
    }

    async fn recv(&self, timeout: Duration) -> Result<Option<CanFrame>, TransportError> {
        let socket = self.socket.clone();
        let result = tokio::task::spawn_blocking(move || {
            socket.set_read_timeout(timeout)?;
            socket.read_frame()
        })
        .await
        .map_err(|e| TransportError::ReceiveFailed(format!("Receive task join error: {}", e)))?;

        let raw = match result {
            Ok(raw) => raw,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Ok(None)
            }
            Err(e) => {
                return Err(TransportError::ReceiveFailed(format!(
                    "read on {} failed: {}",
                    self.interface, e
                )))
            }
        };

        // Only classic data frames with 11-bit ids exist on this network;
        // anything else is dropped like noise.
        let socketcan::CanFrame::Data(data_frame) = raw else {
            return Ok(None);
        };
        let socketcan::Id::Standard(id) = data_frame.id() else {
            return Ok(None);
        };

        let frame = CanFrame::new(id.as_raw() as u32, data_frame.data().to_vec())
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
        trace!(interface = %self.interface, %frame, "socketcan rx");
        Ok(Some(frame))
    }
}
