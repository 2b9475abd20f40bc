//! micro:bit GATT Profile
//!
//! UUIDs of the services and characteristics this client understands, and the
//! mapping from a discovered characteristic UUID to the role it plays in the
//! session.
//!
//! Custom micro:bit services share the base `E95Dxxxx-251D-470A-A062-FA1922DFA9A8`.
//! The UART service uses the Nordic base, with the micro:bit's own TX/RX naming.

use crate::domain::models::ServiceKind;
use uuid::Uuid;

/// Bluetooth SIG base UUID, used to expand 16-bit assigned numbers.
const SIG_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;

/// Expand a 16-bit SIG assigned number into a full 128-bit UUID.
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(SIG_BASE_UUID | ((short as u128) << 96))
}

// Device Information Service (Standard BLE)
pub const DEVICE_INFO_SERVICE_UUID: Uuid = uuid_from_u16(0x180a);
pub const MODEL_NUMBER_CHAR_UUID: Uuid = uuid_from_u16(0x2a24);
pub const SERIAL_NUMBER_CHAR_UUID: Uuid = uuid_from_u16(0x2a25);
pub const FIRMWARE_REVISION_CHAR_UUID: Uuid = uuid_from_u16(0x2a26);

// IO Pin Service
pub const IO_PIN_SERVICE_UUID: Uuid = Uuid::from_u128(0xe95d_127b_251d_470a_a062_fa1922dfa9a8);
pub const PIN_DATA_CHAR_UUID: Uuid = Uuid::from_u128(0xe95d_8d00_251d_470a_a062_fa1922dfa9a8);
pub const PIN_AD_CONFIG_CHAR_UUID: Uuid =
    Uuid::from_u128(0xe95d_5899_251d_470a_a062_fa1922dfa9a8);
pub const PIN_IO_CONFIG_CHAR_UUID: Uuid =
    Uuid::from_u128(0xe95d_b9fe_251d_470a_a062_fa1922dfa9a8);

// Event Service
pub const EVENT_SERVICE_UUID: Uuid = Uuid::from_u128(0xe95d_93af_251d_470a_a062_fa1922dfa9a8);
pub const CLIENT_REQUIREMENT_CHAR_UUID: Uuid =
    Uuid::from_u128(0xe95d_23c4_251d_470a_a062_fa1922dfa9a8);
pub const CLIENT_EVENT_CHAR_UUID: Uuid = Uuid::from_u128(0xe95d_5404_251d_470a_a062_fa1922dfa9a8);
pub const MICROBIT_EVENT_CHAR_UUID: Uuid =
    Uuid::from_u128(0xe95d_9775_251d_470a_a062_fa1922dfa9a8);

// UART Service
pub const UART_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e24dcca9e);
/// Data from the micro:bit (indicate/notify)
pub const UART_TX_CHAR_UUID: Uuid = Uuid::from_u128(0x6e40_0002_b5a3_f393_e0a9_e50e24dcca9e);
/// Data to the micro:bit (write)
pub const UART_RX_CHAR_UUID: Uuid = Uuid::from_u128(0x6e40_0003_b5a3_f393_e0a9_e50e24dcca9e);

/// Eddystone service data key ("FEAA")
pub const EDDYSTONE_SERVICE_UUID: Uuid = uuid_from_u16(0xfeaa);

/// Event id written to ClientRequirement as soon as it binds. The peripheral
/// requires an encrypted link to accept it, which forces pairing.
pub const FORCE_PAIRING_EVENT_ID: u16 = 9501;

/// Logical role a bound characteristic plays in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CharacteristicRole {
    ModelNumber,
    SerialNumber,
    FirmwareRevision,
    PinData,
    PinAd,
    PinIo,
    ClientRequirement,
    ClientEvent,
    MicrobitEvent,
    UartRx,
    UartTx,
}

impl CharacteristicRole {
    /// Every role, in registry order
    pub const ALL: [CharacteristicRole; 11] = [
        Self::ModelNumber,
        Self::SerialNumber,
        Self::FirmwareRevision,
        Self::PinData,
        Self::PinAd,
        Self::PinIo,
        Self::ClientRequirement,
        Self::ClientEvent,
        Self::MicrobitEvent,
        Self::UartRx,
        Self::UartTx,
    ];

    /// Characteristic UUID for this role
    pub fn uuid(self) -> Uuid {
        match self {
            Self::ModelNumber => MODEL_NUMBER_CHAR_UUID,
            Self::SerialNumber => SERIAL_NUMBER_CHAR_UUID,
            Self::FirmwareRevision => FIRMWARE_REVISION_CHAR_UUID,
            Self::PinData => PIN_DATA_CHAR_UUID,
            Self::PinAd => PIN_AD_CONFIG_CHAR_UUID,
            Self::PinIo => PIN_IO_CONFIG_CHAR_UUID,
            Self::ClientRequirement => CLIENT_REQUIREMENT_CHAR_UUID,
            Self::ClientEvent => CLIENT_EVENT_CHAR_UUID,
            Self::MicrobitEvent => MICROBIT_EVENT_CHAR_UUID,
            Self::UartRx => UART_RX_CHAR_UUID,
            Self::UartTx => UART_TX_CHAR_UUID,
        }
    }

    /// Resolve a discovered characteristic UUID. Unknown UUIDs yield `None`.
    pub fn from_uuid(uuid: &Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.uuid() == *uuid)
    }

    /// Logical service this role belongs to
    pub fn service(self) -> ServiceKind {
        match self {
            Self::ModelNumber | Self::SerialNumber | Self::FirmwareRevision => {
                ServiceKind::DeviceInfo
            }
            Self::PinData | Self::PinAd | Self::PinIo => ServiceKind::IoPin,
            Self::ClientRequirement | Self::ClientEvent | Self::MicrobitEvent => {
                ServiceKind::Event
            }
            Self::UartRx | Self::UartTx => ServiceKind::Uart,
        }
    }
}

impl ServiceKind {
    pub fn uuid(self) -> Uuid {
        match self {
            Self::DeviceInfo => DEVICE_INFO_SERVICE_UUID,
            Self::IoPin => IO_PIN_SERVICE_UUID,
            Self::Event => EVENT_SERVICE_UUID,
            Self::Uart => UART_SERVICE_UUID,
        }
    }

    /// Roles that must all be bound before the service is announced
    pub fn roles(self) -> impl Iterator<Item = CharacteristicRole> {
        CharacteristicRole::ALL
            .into_iter()
            .filter(move |role| role.service() == self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_uuid_expansion() {
        assert_eq!(
            DEVICE_INFO_SERVICE_UUID.to_string(),
            "0000180a-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            EDDYSTONE_SERVICE_UUID.to_string(),
            "0000feaa-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_microbit_uuids_are_verbatim() {
        assert_eq!(
            IO_PIN_SERVICE_UUID.to_string(),
            "e95d127b-251d-470a-a062-fa1922dfa9a8"
        );
        assert_eq!(
            EVENT_SERVICE_UUID.to_string(),
            "e95d93af-251d-470a-a062-fa1922dfa9a8"
        );
        assert_eq!(
            UART_SERVICE_UUID.to_string(),
            "6e400001-b5a3-f393-e0a9-e50e24dcca9e"
        );
    }

    #[test]
    fn test_every_role_resolves_to_itself() {
        for role in CharacteristicRole::ALL {
            assert_eq!(CharacteristicRole::from_uuid(&role.uuid()), Some(role));
        }
    }

    #[test]
    fn test_unknown_uuid_is_ignored() {
        assert_eq!(CharacteristicRole::from_uuid(&uuid_from_u16(0x2a00)), None);
        assert_eq!(CharacteristicRole::from_uuid(&UART_SERVICE_UUID), None);
    }

    #[test]
    fn test_service_roles() {
        let device_info: Vec<_> = ServiceKind::DeviceInfo.roles().collect();
        assert_eq!(
            device_info,
            vec![
                CharacteristicRole::ModelNumber,
                CharacteristicRole::SerialNumber,
                CharacteristicRole::FirmwareRevision
            ]
        );
        assert_eq!(ServiceKind::Uart.roles().count(), 2);
        assert_eq!(ServiceKind::Event.roles().count(), 3);
        assert_eq!(ServiceKind::IoPin.roles().count(), 3);
    }
}
