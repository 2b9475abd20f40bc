//! BBC micro:bit BLE client
//!
//! Finds a micro:bit by its advertised name, connects, discovers its GATT
//! profile and exposes the Device Information, IO Pin, Event and UART
//! services through a small command surface and delegate callbacks.

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use domain::models::{
    AdvertisementData, AppEvent, ConnectionState, DeviceInfo, EventKind, MicrobitEvent,
    PinConfig, PinValues, ServiceKind,
};
pub use domain::settings::{Settings, SettingsService};
pub use error::{DecodeError, RadioError, SessionError};
pub use infrastructure::bluetooth::{
    MicrobitHandle, MicrobitService, MicrobitSession, RadioEvent, RadioStack, SessionConfig,
    SessionDelegate,
};
pub use infrastructure::logging::init_logger;
