//! BLE Connection Module
//!
//! Connection State Machine for one micro:bit session. Radio callbacks come in
//! through [`MicrobitSession::handle_event`]; requests go out through the
//! [`RadioStack`]; results go to the [`SessionDelegate`].
//!
//! ```text
//! Idle -> Scanning -> Connecting -> DiscoveringServices
//!      -> DiscoveringCharacteristics { pending } -> Bound
//!      -> Disconnected
//! ```
//!
//! Each role is usable as soon as its characteristic binds. A service is
//! announced once all of its roles are bound, checked after every
//! characteristic batch so arrival order inside a batch does not matter.

use crate::domain::diagnostic_log::DiagnosticLog;
use crate::domain::models::{
    ConnectionState, DeviceInfo, EventKind, MicrobitEvent, PinConfig, PinValues, ServiceKind,
    NOT_AVAILABLE,
};
use crate::domain::settings::Settings;
use crate::error::{RadioError, SessionError};
use crate::infrastructure::bluetooth::codec;
use crate::infrastructure::bluetooth::delegate::SessionDelegate;
use crate::infrastructure::bluetooth::protocol::{CharacteristicRole, FORCE_PAIRING_EVENT_ID};
use crate::infrastructure::bluetooth::radio::{
    CharacteristicHandle, DiscoveredCharacteristic, PeripheralHandle, RadioEvent, RadioStack,
    ScanResult, ServiceHandle,
};
use crate::infrastructure::bluetooth::scanner;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info, trace, warn};

/// Forwarded to the delegate when a UART message is not valid UTF-8
pub const UART_DECODE_ERROR: &str = "<unable to decode UART message>";

/// Event ids must fit in a non-negative 16-bit signed integer
pub const EVENT_ID_LIMIT: u16 = 0x8000;

/// Configuration for session behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Advertised local name to connect to
    pub device_name: String,
    /// Diagnostic log capacity
    pub log_capacity: usize,
    /// Largest single UART write in bytes
    pub uart_chunk_size: usize,
}

impl SessionConfig {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            ..Self::from(&Settings::default())
        }
    }
}

impl From<&Settings> for SessionConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            device_name: settings.device_name.clone(),
            log_capacity: settings.diagnostic_log_capacity,
            uart_chunk_size: settings.uart_chunk_size,
        }
    }
}

/// Role <-> characteristic handle bindings. A role binds at most once.
#[derive(Debug, Default)]
pub struct BindingTable {
    by_role: HashMap<CharacteristicRole, CharacteristicHandle>,
    by_handle: HashMap<CharacteristicHandle, CharacteristicRole>,
}

impl BindingTable {
    /// Returns false, leaving the table unchanged, if the role is already bound
    pub fn bind(&mut self, role: CharacteristicRole, handle: CharacteristicHandle) -> bool {
        if self.by_role.contains_key(&role) {
            return false;
        }
        self.by_role.insert(role, handle);
        self.by_handle.insert(handle, role);
        true
    }

    pub fn get(&self, role: CharacteristicRole) -> Option<CharacteristicHandle> {
        self.by_role.get(&role).copied()
    }

    pub fn role_of(&self, handle: CharacteristicHandle) -> Option<CharacteristicRole> {
        self.by_handle.get(&handle).copied()
    }

    pub fn contains(&self, role: CharacteristicRole) -> bool {
        self.by_role.contains_key(&role)
    }

    pub fn len(&self) -> usize {
        self.by_role.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_role.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_role.clear();
        self.by_handle.clear();
    }
}

/// One micro:bit session: a single target peripheral, its bindings and log
pub struct MicrobitSession<R, D> {
    radio: R,
    delegate: D,
    config: SessionConfig,
    powered_on: bool,
    state: ConnectionState,
    /// Bumped on every state transition; discovery deadlines carry it
    epoch: u64,
    peripheral: Option<PeripheralHandle>,
    bindings: BindingTable,
    pending_services: HashSet<ServiceHandle>,
    announced: BTreeSet<ServiceKind>,
    device_info: DeviceInfo,
    log: DiagnosticLog,
}

impl<R: RadioStack, D: SessionDelegate> MicrobitSession<R, D> {
    pub fn new(radio: R, delegate: D, config: SessionConfig) -> Self {
        let log = DiagnosticLog::with_capacity(config.log_capacity);
        Self {
            radio,
            delegate,
            config,
            powered_on: false,
            state: ConnectionState::Idle,
            epoch: 0,
            peripheral: None,
            bindings: BindingTable::default(),
            pending_services: HashSet::new(),
            announced: BTreeSet::new(),
            device_info: DeviceInfo::default(),
            log,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_powered_on(&self) -> bool {
        self.powered_on
    }

    pub fn peripheral(&self) -> Option<PeripheralHandle> {
        self.peripheral
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    pub fn is_bound(&self, role: CharacteristicRole) -> bool {
        self.bindings.contains(role)
    }

    pub fn is_available(&self, service: ServiceKind) -> bool {
        self.announced.contains(&service)
    }

    pub fn diagnostic_log(&self) -> Vec<String> {
        self.log.snapshot()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ---------------------------------------------------------------------
    // Radio callbacks
    // ---------------------------------------------------------------------

    /// Apply one radio stack callback
    pub fn handle_event(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::PowerStateChanged { powered_on } => self.on_power_state(powered_on),
            RadioEvent::ScanResult(scan) => self.on_scan_result(&scan),
            RadioEvent::Connected { peripheral } => self.on_connected(peripheral),
            RadioEvent::Disconnected { peripheral } => self.on_disconnected(peripheral),
            RadioEvent::ServicesDiscovered {
                peripheral,
                services,
            } => self.on_services_discovered(peripheral, services),
            RadioEvent::CharacteristicsDiscovered {
                service,
                characteristics,
            } => self.on_characteristics_discovered(service, characteristics),
            RadioEvent::ValueUpdated {
                characteristic,
                value,
            } => self.on_value_updated(characteristic, value),
        }
    }

    fn on_power_state(&mut self, powered_on: bool) {
        if powered_on == self.powered_on {
            return;
        }
        self.powered_on = powered_on;

        if powered_on {
            self.log_line("Bluetooth powered on");
        } else {
            self.log_line("Bluetooth powered off");
            self.reset(ConnectionState::Idle);
        }
    }

    fn on_scan_result(&mut self, scan: &ScanResult) {
        if let Some(sighting) = scanner::analyze_advertisement(scan) {
            self.log_line(&sighting.describe());
            if let Some(data) = sighting.advertisement_data() {
                self.delegate.advertisement_data(&data);
            }
        }

        if self.state != ConnectionState::Scanning || self.peripheral.is_some() {
            trace!("Scan result outside of scanning, not matching");
            return;
        }

        if !scanner::is_target(scan, &self.config.device_name) {
            self.log_line(&format!(
                "Skipping {} ({} dBm), looking for {}",
                scanner::display_name(scan),
                scan.signal_strength,
                self.config.device_name
            ));
            return;
        }

        self.radio.stop_scan();
        self.peripheral = Some(scan.peripheral);
        self.log_line(&format!(
            "Found {} ({} dBm), connecting",
            self.config.device_name, scan.signal_strength
        ));
        self.set_state(ConnectionState::Connecting);
        self.radio.connect(scan.peripheral);
    }

    fn on_connected(&mut self, peripheral: PeripheralHandle) {
        if self.peripheral != Some(peripheral) || self.state != ConnectionState::Connecting {
            warn!("Ignoring connection of unexpected peripheral {:?}", peripheral);
            return;
        }

        self.log_line("Connected, discovering services");
        self.set_state(ConnectionState::DiscoveringServices);
        self.radio.discover_services(peripheral);
    }

    fn on_disconnected(&mut self, peripheral: PeripheralHandle) {
        if self.peripheral != Some(peripheral) {
            debug!("Disconnect of unrelated peripheral {:?}", peripheral);
            return;
        }

        self.log_line("Peripheral disconnected");
        self.reset(ConnectionState::Disconnected);
    }

    fn on_services_discovered(
        &mut self,
        peripheral: PeripheralHandle,
        services: Result<Vec<ServiceHandle>, RadioError>,
    ) {
        if self.peripheral != Some(peripheral)
            || self.state != ConnectionState::DiscoveringServices
        {
            warn!("Ignoring unexpected service discovery result");
            return;
        }

        let services = match services {
            Ok(services) => services,
            Err(e) => {
                self.log_line(&format!("Service discovery failed: {}", e));
                return;
            }
        };

        self.log_line(&format!("Discovered {} service(s)", services.len()));
        if services.is_empty() {
            self.set_state(ConnectionState::Bound);
            return;
        }

        self.pending_services = services.iter().copied().collect();
        self.set_state(ConnectionState::DiscoveringCharacteristics {
            pending: self.pending_services.len(),
        });
        for service in services {
            self.radio.discover_characteristics(peripheral, service);
        }
    }

    fn on_characteristics_discovered(
        &mut self,
        service: ServiceHandle,
        characteristics: Result<Vec<DiscoveredCharacteristic>, RadioError>,
    ) {
        if self.peripheral.is_none()
            || !matches!(
                self.state,
                ConnectionState::DiscoveringCharacteristics { .. } | ConnectionState::Bound
            )
        {
            warn!("Ignoring characteristics for {:?} outside discovery", service);
            return;
        }

        self.pending_services.remove(&service);

        match characteristics {
            Ok(characteristics) => {
                for characteristic in characteristics {
                    self.bind_characteristic(&characteristic);
                }
            }
            Err(e) => {
                self.log_line(&format!("Characteristic discovery failed: {}", e));
            }
        }

        self.announce_ready_services();

        if self.pending_services.is_empty() {
            if self.state != ConnectionState::Bound {
                self.log_line(&format!(
                    "Discovery complete, {} characteristic(s) bound",
                    self.bindings.len()
                ));
            }
            self.set_state(ConnectionState::Bound);
        } else {
            self.set_state(ConnectionState::DiscoveringCharacteristics {
                pending: self.pending_services.len(),
            });
        }
    }

    fn bind_characteristic(&mut self, characteristic: &DiscoveredCharacteristic) {
        let Some(role) = CharacteristicRole::from_uuid(&characteristic.uuid) else {
            trace!("Ignoring characteristic {}", characteristic.uuid);
            return;
        };

        let handle = characteristic.handle;
        if !self.bindings.bind(role, handle) {
            warn!("{:?} already bound, ignoring {:?}", role, handle);
            return;
        }
        debug!("Bound {:?} to {:?}", role, handle);

        match role {
            CharacteristicRole::ModelNumber
            | CharacteristicRole::SerialNumber
            | CharacteristicRole::FirmwareRevision => self.radio.read_value(handle),
            CharacteristicRole::ClientRequirement => {
                // Force pairing
                let record = MicrobitEvent::new(FORCE_PAIRING_EVENT_ID, 0).to_bytes();
                self.radio.write_value(handle, &record);
            }
            CharacteristicRole::MicrobitEvent
            | CharacteristicRole::UartTx
            | CharacteristicRole::PinData => self.radio.set_notify(handle, true),
            CharacteristicRole::ClientEvent
            | CharacteristicRole::UartRx
            | CharacteristicRole::PinAd
            | CharacteristicRole::PinIo => {}
        }
    }

    fn announce_ready_services(&mut self) {
        for service in ServiceKind::ALL {
            if self.announced.contains(&service) {
                continue;
            }
            if service.roles().all(|role| self.bindings.contains(role)) {
                self.announced.insert(service);
                self.log_line(&format!("{} service available", service));
                self.delegate.service_available(service);
            }
        }
    }

    fn on_value_updated(
        &mut self,
        characteristic: CharacteristicHandle,
        value: Result<Vec<u8>, RadioError>,
    ) {
        let Some(role) = self.bindings.role_of(characteristic) else {
            trace!("Value for unbound characteristic {:?}", characteristic);
            return;
        };

        let value = match value {
            Ok(value) => value,
            Err(e) => {
                self.log_line(&format!("Reading {:?} failed: {}", role, e));
                return;
            }
        };

        match role {
            CharacteristicRole::ModelNumber
            | CharacteristicRole::SerialNumber
            | CharacteristicRole::FirmwareRevision => self.update_device_info(role, &value),
            CharacteristicRole::UartTx => {
                let message = codec::decode_text(&value).unwrap_or_else(|e| {
                    warn!("UART payload {}: {}", codec::to_hex(&value), e);
                    UART_DECODE_ERROR.to_string()
                });
                self.delegate.uart_received(&message);
            }
            CharacteristicRole::PinData => {
                let values = codec::decode_pin_values(&value);
                self.delegate.pin_values_updated(&values);
            }
            CharacteristicRole::MicrobitEvent => {
                for event in codec::decode_events(&value) {
                    self.delegate.microbit_event(event);
                }
            }
            CharacteristicRole::ClientRequirement
            | CharacteristicRole::ClientEvent
            | CharacteristicRole::UartRx
            | CharacteristicRole::PinAd
            | CharacteristicRole::PinIo => {
                trace!("Ignoring value update for write-only {:?}", role);
            }
        }
    }

    fn update_device_info(&mut self, role: CharacteristicRole, value: &[u8]) {
        let text = codec::decode_text(value).unwrap_or_else(|_| NOT_AVAILABLE.to_string());
        let (label, field) = match role {
            CharacteristicRole::ModelNumber => ("Model number", &mut self.device_info.model_number),
            CharacteristicRole::SerialNumber => {
                ("Serial number", &mut self.device_info.serial_number)
            }
            CharacteristicRole::FirmwareRevision => {
                ("Firmware revision", &mut self.device_info.firmware_revision)
            }
            _ => return,
        };
        *field = text;

        let line = format!("{}: {}", label, field);
        self.log_line(&line);
        self.delegate.device_info_updated(&self.device_info);
    }

    /// A discovery deadline armed at `epoch` expired
    pub fn stage_timed_out(&mut self, epoch: u64) {
        if epoch != self.epoch || !self.state.is_discovery_stage() {
            return;
        }

        match self.state {
            ConnectionState::Connecting | ConnectionState::DiscoveringServices => {
                let stage = if self.state == ConnectionState::Connecting {
                    "Connection"
                } else {
                    "Service discovery"
                };
                self.log_line(&format!("{} timed out, giving up", stage));
                if let Some(peripheral) = self.peripheral {
                    self.radio.cancel_connection(peripheral);
                }
                self.reset(ConnectionState::Disconnected);
            }
            ConnectionState::DiscoveringCharacteristics { pending } => {
                self.log_line(&format!(
                    "Characteristic discovery timed out with {} service(s) outstanding",
                    pending
                ));
                self.pending_services.clear();
                self.set_state(ConnectionState::Bound);
            }
            _ => {}
        }
    }

    // ---------------------------------------------------------------------
    // Public operations
    // ---------------------------------------------------------------------

    pub fn start_scanning(&mut self) -> Result<(), SessionError> {
        self.require_radio()?;
        if self.peripheral.is_some() {
            self.log_line("Already bound to a peripheral, disconnect before scanning");
            return Ok(());
        }

        self.log_line(&format!("Scanning for {}", self.config.device_name));
        self.radio.scan();
        self.set_state(ConnectionState::Scanning);
        Ok(())
    }

    pub fn stop_scanning(&mut self) -> Result<(), SessionError> {
        self.require_radio()?;
        self.radio.stop_scan();
        if self.state == ConnectionState::Scanning {
            self.log_line("Scan stopped");
            self.set_state(ConnectionState::Idle);
        }
        Ok(())
    }

    pub fn disconnect(&mut self) -> Result<(), SessionError> {
        self.require_radio()?;
        let Some(peripheral) = self.peripheral else {
            self.log_line("No peripheral connected, nothing to disconnect");
            return Err(SessionError::PeripheralAbsent);
        };

        self.radio.cancel_connection(peripheral);
        self.log_line("Disconnecting");
        self.reset(ConnectionState::Disconnected);
        Ok(())
    }

    /// Send text over UART, split into writes of at most `uart_chunk_size` bytes
    pub fn send_uart(&mut self, message: &str) -> Result<(), SessionError> {
        let handle = self.require_role(CharacteristicRole::UartRx)?;
        let chunks = codec::split_utf8(message, self.config.uart_chunk_size);
        if chunks.len() > 1 {
            debug!("UART message split into {} writes", chunks.len());
        }
        for chunk in chunks {
            self.radio.write_value(handle, chunk.as_bytes());
        }
        Ok(())
    }

    pub fn configure_pins_analogue(&mut self, config: &PinConfig) -> Result<(), SessionError> {
        let handle = self.require_role(CharacteristicRole::PinAd)?;
        self.radio.write_value(handle, &codec::encode_pin_mask(config));
        Ok(())
    }

    pub fn configure_pins_read_write(&mut self, config: &PinConfig) -> Result<(), SessionError> {
        let handle = self.require_role(CharacteristicRole::PinIo)?;
        self.radio.write_value(handle, &codec::encode_pin_mask(config));
        Ok(())
    }

    pub fn set_pin_values(&mut self, values: &PinValues) -> Result<(), SessionError> {
        let handle = self.require_role(CharacteristicRole::PinData)?;
        let payload = codec::encode_pin_values(values);
        if !payload.is_empty() {
            self.radio.write_value(handle, &payload);
        }
        Ok(())
    }

    /// Ask the peripheral to report the given event ids (any value)
    pub fn register_events(&mut self, event_ids: &[u16]) -> Result<(), SessionError> {
        if let Some(&bad) = event_ids.iter().find(|&&id| id >= EVENT_ID_LIMIT) {
            self.log_line(&format!("Refusing to register invalid event id {}", bad));
            return Err(SessionError::InvalidEventId(bad));
        }

        let handle = self.require_role(CharacteristicRole::ClientRequirement)?;
        if event_ids.is_empty() {
            return Ok(());
        }

        let records: Vec<MicrobitEvent> = event_ids
            .iter()
            .map(|&id| MicrobitEvent::new(id, 0))
            .collect();
        self.radio.write_value(handle, &codec::encode_events(&records));
        self.log_line(&format!("Registered for events {:?}", event_ids));
        Ok(())
    }

    pub fn raise_event(&mut self, kind: EventKind, value: u16) -> Result<(), SessionError> {
        let handle = self.require_role(CharacteristicRole::ClientEvent)?;
        let record = MicrobitEvent::new(kind.id(), value);
        self.radio.write_value(handle, &record.to_bytes());
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    fn require_radio(&mut self) -> Result<(), SessionError> {
        if self.powered_on {
            return Ok(());
        }
        self.log_line("Bluetooth is not powered on");
        Err(SessionError::RadioUnavailable)
    }

    /// Radio on, peripheral present and the role bound. An unbound role is
    /// reported to tracing only, not to the diagnostic log.
    fn require_role(
        &mut self,
        role: CharacteristicRole,
    ) -> Result<CharacteristicHandle, SessionError> {
        self.require_radio()?;
        if self.peripheral.is_none() {
            self.log_line("No peripheral connected");
            return Err(SessionError::PeripheralAbsent);
        }
        self.bindings.get(role).ok_or_else(|| {
            debug!("{:?} is not supported by this peripheral", role);
            SessionError::CharacteristicUnbound(role)
        })
    }

    fn set_state(&mut self, state: ConnectionState) {
        if state == self.state {
            return;
        }
        debug!("Session state {:?} -> {:?}", self.state, state);
        self.state = state;
        self.epoch += 1;
        self.delegate.state_changed(state);
    }

    /// Forget the peripheral and everything learned from it
    fn reset(&mut self, state: ConnectionState) {
        self.peripheral = None;
        self.bindings.clear();
        self.pending_services.clear();
        self.announced.clear();
        self.device_info = DeviceInfo::default();
        self.set_state(state);
        info!("Session reset to {:?}", state);
    }

    fn log_line(&mut self, message: &str) {
        let entries = self.log.append(message);
        self.delegate.log_updated(entries);
    }
}
