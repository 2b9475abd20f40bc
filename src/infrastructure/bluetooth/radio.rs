//! Radio Stack Interface
//!
//! The host Bluetooth stack is an external collaborator. The session talks to
//! it through [`RadioStack`] (requests going out) and receives its callbacks as
//! [`RadioEvent`]s (results coming in). Every request is fire-and-forget; its
//! outcome arrives later as an event.

use crate::error::RadioError;
use std::collections::HashMap;
use uuid::Uuid;

/// Radio-stack-assigned peripheral handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PeripheralHandle(pub u64);

/// Radio-stack-assigned service handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceHandle(pub u64);

/// Radio-stack-assigned characteristic handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicHandle(pub u64);

/// A characteristic reported during discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredCharacteristic {
    pub handle: CharacteristicHandle,
    pub uuid: Uuid,
}

impl DiscoveredCharacteristic {
    pub fn new(handle: CharacteristicHandle, uuid: Uuid) -> Self {
        Self { handle, uuid }
    }
}

/// One advertisement seen while scanning
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanResult {
    pub peripheral: PeripheralHandle,
    pub local_name: Option<String>,
    pub service_data: HashMap<Uuid, Vec<u8>>,
    pub signal_strength: i16,
}

/// Callbacks delivered by the radio stack, in order, on one logical context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    PowerStateChanged {
        powered_on: bool,
    },
    ScanResult(ScanResult),
    Connected {
        peripheral: PeripheralHandle,
    },
    Disconnected {
        peripheral: PeripheralHandle,
    },
    ServicesDiscovered {
        peripheral: PeripheralHandle,
        services: Result<Vec<ServiceHandle>, RadioError>,
    },
    CharacteristicsDiscovered {
        service: ServiceHandle,
        characteristics: Result<Vec<DiscoveredCharacteristic>, RadioError>,
    },
    ValueUpdated {
        characteristic: CharacteristicHandle,
        value: Result<Vec<u8>, RadioError>,
    },
}

/// Requests the session issues to the radio stack
pub trait RadioStack {
    /// Scan for all peripherals, no service filter
    fn scan(&mut self);

    fn stop_scan(&mut self);

    fn connect(&mut self, peripheral: PeripheralHandle);

    fn cancel_connection(&mut self, peripheral: PeripheralHandle);

    /// Discover every service on the peripheral
    fn discover_services(&mut self, peripheral: PeripheralHandle);

    /// Discover every characteristic of a service
    fn discover_characteristics(&mut self, peripheral: PeripheralHandle, service: ServiceHandle);

    fn read_value(&mut self, characteristic: CharacteristicHandle);

    /// Write with response
    fn write_value(&mut self, characteristic: CharacteristicHandle, value: &[u8]);

    fn set_notify(&mut self, characteristic: CharacteristicHandle, enabled: bool);
}

impl<R: RadioStack + ?Sized> RadioStack for Box<R> {
    fn scan(&mut self) {
        (**self).scan()
    }

    fn stop_scan(&mut self) {
        (**self).stop_scan()
    }

    fn connect(&mut self, peripheral: PeripheralHandle) {
        (**self).connect(peripheral)
    }

    fn cancel_connection(&mut self, peripheral: PeripheralHandle) {
        (**self).cancel_connection(peripheral)
    }

    fn discover_services(&mut self, peripheral: PeripheralHandle) {
        (**self).discover_services(peripheral)
    }

    fn discover_characteristics(&mut self, peripheral: PeripheralHandle, service: ServiceHandle) {
        (**self).discover_characteristics(peripheral, service)
    }

    fn read_value(&mut self, characteristic: CharacteristicHandle) {
        (**self).read_value(characteristic)
    }

    fn write_value(&mut self, characteristic: CharacteristicHandle, value: &[u8]) {
        (**self).write_value(characteristic, value)
    }

    fn set_notify(&mut self, characteristic: CharacteristicHandle, enabled: bool) {
        (**self).set_notify(characteristic, enabled)
    }
}

/// Request as recorded by [`RecordingRadio`]
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioRequest {
    Scan,
    StopScan,
    Connect(PeripheralHandle),
    CancelConnection(PeripheralHandle),
    DiscoverServices(PeripheralHandle),
    DiscoverCharacteristics(ServiceHandle),
    Read(CharacteristicHandle),
    Write(CharacteristicHandle, Vec<u8>),
    SetNotify(CharacteristicHandle, bool),
}

/// In-memory radio that records every request; clones share one log
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct RecordingRadio {
    requests: std::sync::Arc<std::sync::Mutex<Vec<RadioRequest>>>,
}

#[cfg(test)]
impl RecordingRadio {
    pub fn requests(&self) -> Vec<RadioRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn take(&self) -> Vec<RadioRequest> {
        std::mem::take(&mut *self.requests.lock().unwrap())
    }

    pub fn writes_to(&self, characteristic: CharacteristicHandle) -> Vec<Vec<u8>> {
        self.requests()
            .into_iter()
            .filter_map(|request| match request {
                RadioRequest::Write(handle, value) if handle == characteristic => Some(value),
                _ => None,
            })
            .collect()
    }

    fn record(&self, request: RadioRequest) {
        self.requests.lock().unwrap().push(request);
    }
}

#[cfg(test)]
impl RadioStack for RecordingRadio {
    fn scan(&mut self) {
        self.record(RadioRequest::Scan);
    }

    fn stop_scan(&mut self) {
        self.record(RadioRequest::StopScan);
    }

    fn connect(&mut self, peripheral: PeripheralHandle) {
        self.record(RadioRequest::Connect(peripheral));
    }

    fn cancel_connection(&mut self, peripheral: PeripheralHandle) {
        self.record(RadioRequest::CancelConnection(peripheral));
    }

    fn discover_services(&mut self, peripheral: PeripheralHandle) {
        self.record(RadioRequest::DiscoverServices(peripheral));
    }

    fn discover_characteristics(&mut self, _peripheral: PeripheralHandle, service: ServiceHandle) {
        self.record(RadioRequest::DiscoverCharacteristics(service));
    }

    fn read_value(&mut self, characteristic: CharacteristicHandle) {
        self.record(RadioRequest::Read(characteristic));
    }

    fn write_value(&mut self, characteristic: CharacteristicHandle, value: &[u8]) {
        self.record(RadioRequest::Write(characteristic, value.to_vec()));
    }

    fn set_notify(&mut self, characteristic: CharacteristicHandle, enabled: bool) {
        self.record(RadioRequest::SetNotify(characteristic, enabled));
    }
}
