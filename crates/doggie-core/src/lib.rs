//! doggie-core - Protocol substrate for the Doggie Lab ECU network
//!
//! This crate provides everything an emulated ECU needs to talk on the bus,
//! without any of the vehicle logic:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         ECU tasks                             │
//! │        (typed messages via the codec in `messages`)           │
//! └───────────────┬───────────────────────────▲──────────────────┘
//!                 │ send                      │ per-listener queues
//!                 │                   ┌───────┴────────┐
//!                 │                   │    Notifier    │ ◄── IsoTpSocket
//!                 │                   └───────▲────────┘
//!          ┌──────▼───────────────────────────┴──────┐
//!          │                ProxyBus                  │
//!          │   tx transport            rx transport   │
//!          └──────┬───────────────────────────▲──────┘
//!                 ▼                           │
//!        VirtualCanInterface / SocketCanTransport
//! ```

pub mod error;
pub mod frame;
pub mod ids;
pub mod isotp;
pub mod messages;
pub mod notifier;
pub mod transport;

pub use error::FrameError;
pub use frame::CanFrame;
pub use isotp::{IsoTpConfig, IsoTpError, IsoTpSocket};
pub use messages::{Addressing, EcuMessage, Message};
pub use notifier::{ListenerId, Notifier};
pub use transport::{CanTransport, ProxyBus, SharedBus, TransportError, VirtualCanBus};
