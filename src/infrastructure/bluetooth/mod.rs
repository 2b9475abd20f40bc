//! Bluetooth Module
//!
//! GATT client for the BBC micro:bit.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     MicrobitService                       │
//! │   (tokio task - serialises commands and radio events)     │
//! └─────────────────────┬────────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                     MicrobitSession                       │
//! │  (connection state machine, bindings, diagnostic log)     │
//! └───┬──────────────┬──────────────┬──────────────┬─────────┘
//!     │              │              │              │
//!     ▼              ▼              ▼              ▼
//! ┌─────────┐  ┌───────────┐  ┌──────────┐  ┌────────────────┐
//! │ Scanner │  │  Codec    │  │ Protocol │  │ RadioStack /   │
//! │         │  │           │  │          │  │ SessionDelegate│
//! │ - match │  │ - pins    │  │ - UUIDs  │  │                │
//! │ - Eddy- │  │ - events  │  │ - roles  │  │ - host radio   │
//! │   stone │  │ - text    │  │          │  │ - application  │
//! └─────────┘  └───────────┘  └──────────┘  └────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Service and characteristic UUIDs, characteristic roles
//! - [`codec`] - Little-endian integers, pin payloads, event records, Eddystone frames
//! - [`scanner`] - Target matching and advertisement analysis
//! - [`radio`] - Interface to the host Bluetooth stack
//! - [`delegate`] - Notifications toward the application
//! - [`connection`] - Connection state machine
//! - [`service`] - Async service running a session

pub mod codec;
pub mod connection;
pub mod delegate;
pub mod protocol;
pub mod radio;
pub mod scanner;
pub mod service;

pub use connection::{MicrobitSession, SessionConfig};
pub use delegate::SessionDelegate;
pub use radio::{RadioEvent, RadioStack};
pub use service::{MicrobitHandle, MicrobitService, SessionCommand};
