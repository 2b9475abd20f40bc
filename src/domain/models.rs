use std::collections::BTreeMap;
use std::fmt;

/// Placeholder for device information that has not been read (or failed to decode)
pub const NOT_AVAILABLE: &str = "n/a";

/// Pin index -> 8-bit pin value
pub type PinValues = BTreeMap<u8, u8>;

/// Pin index -> enabled flag, used for analogue and input/output configuration
pub type PinConfig = BTreeMap<u8, bool>;

/// Logical micro:bit service, announced once its characteristics are bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceKind {
    DeviceInfo,
    IoPin,
    Uart,
    Event,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 4] = [Self::DeviceInfo, Self::IoPin, Self::Uart, Self::Event];
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DeviceInfo => "Device Information",
            Self::IoPin => "IO Pin",
            Self::Uart => "UART",
            Self::Event => "Event",
        };
        f.write_str(name)
    }
}

/// Strings read from the Device Information service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub model_number: String,
    pub serial_number: String,
    pub firmware_revision: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            model_number: NOT_AVAILABLE.to_string(),
            serial_number: NOT_AVAILABLE.to_string(),
            firmware_revision: NOT_AVAILABLE.to_string(),
        }
    }
}

/// A micro:bit event record: 16-bit event source id and 16-bit value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MicrobitEvent {
    pub kind: u16,
    pub value: u16,
}

/// Well-known micro:bit event service ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    RemoteControl,
    Camera,
    AudioRecorder,
    Alerts,
    SignalStrength,
    DeviceInfo,
    DpadController,
    BroadcastGeneral,
    Custom(u16),
}

impl EventKind {
    pub fn id(self) -> u16 {
        match self {
            Self::RemoteControl => 1001,
            Self::Camera => 1002,
            Self::AudioRecorder => 1003,
            Self::Alerts => 1004,
            Self::SignalStrength => 1101,
            Self::DeviceInfo => 1103,
            Self::DpadController => 1104,
            Self::BroadcastGeneral => 2000,
            Self::Custom(id) => id,
        }
    }
}

impl From<u16> for EventKind {
    fn from(id: u16) -> Self {
        match id {
            1001 => Self::RemoteControl,
            1002 => Self::Camera,
            1003 => Self::AudioRecorder,
            1004 => Self::Alerts,
            1101 => Self::SignalStrength,
            1103 => Self::DeviceInfo,
            1104 => Self::DpadController,
            2000 => Self::BroadcastGeneral,
            other => Self::Custom(other),
        }
    }
}

/// Decoded Eddystone fields from one advertisement
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdvertisementData {
    pub url: Option<String>,
    pub namespace: Option<u64>,
    pub instance: Option<u32>,
    pub signal_strength: i16,
}

/// Progress of the connection/discovery sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Scanning,
    Connecting,
    DiscoveringServices,
    DiscoveringCharacteristics { pending: usize },
    Bound,
    Disconnected,
}

impl ConnectionState {
    /// States in which a discovery deadline applies
    pub fn is_discovery_stage(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::DiscoveringServices | Self::DiscoveringCharacteristics { .. }
        )
    }
}

/// Everything the session reports outward, for channel-based consumers
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    LogUpdated(Vec<String>),
    Advertisement(AdvertisementData),
    ServiceAvailable(ServiceKind),
    UartReceived(String),
    PinValuesUpdated(PinValues),
    MicrobitEvent(MicrobitEvent),
    DeviceInfoUpdated(DeviceInfo),
    StateChanged(ConnectionState),
}
