//! Delegate Notification Surface
//!
//! Callbacks the session invokes toward the application. The delegate only
//! ever receives successfully decoded data.

use crate::domain::models::{
    AdvertisementData, AppEvent, ConnectionState, DeviceInfo, MicrobitEvent, PinValues,
    ServiceKind,
};
use tokio::sync::mpsc;

/// Receiver of session notifications. Every method defaults to a no-op.
pub trait SessionDelegate {
    /// Full diagnostic log buffer after every change, oldest first
    fn log_updated(&mut self, _entries: Vec<String>) {}

    fn advertisement_data(&mut self, _data: &AdvertisementData) {}

    fn service_available(&mut self, _service: ServiceKind) {}

    fn uart_received(&mut self, _message: &str) {}

    fn pin_values_updated(&mut self, _values: &PinValues) {}

    fn microbit_event(&mut self, _event: MicrobitEvent) {}

    fn device_info_updated(&mut self, _info: &DeviceInfo) {}

    fn state_changed(&mut self, _state: ConnectionState) {}
}

impl<D: SessionDelegate + ?Sized> SessionDelegate for Box<D> {
    fn log_updated(&mut self, entries: Vec<String>) {
        (**self).log_updated(entries)
    }

    fn advertisement_data(&mut self, data: &AdvertisementData) {
        (**self).advertisement_data(data)
    }

    fn service_available(&mut self, service: ServiceKind) {
        (**self).service_available(service)
    }

    fn uart_received(&mut self, message: &str) {
        (**self).uart_received(message)
    }

    fn pin_values_updated(&mut self, values: &PinValues) {
        (**self).pin_values_updated(values)
    }

    fn microbit_event(&mut self, event: MicrobitEvent) {
        (**self).microbit_event(event)
    }

    fn device_info_updated(&mut self, info: &DeviceInfo) {
        (**self).device_info_updated(info)
    }

    fn state_changed(&mut self, state: ConnectionState) {
        (**self).state_changed(state)
    }
}

/// Forwards every notification as an [`AppEvent`]. A closed receiver is ignored.
impl SessionDelegate for mpsc::UnboundedSender<AppEvent> {
    fn log_updated(&mut self, entries: Vec<String>) {
        let _ = self.send(AppEvent::LogUpdated(entries));
    }

    fn advertisement_data(&mut self, data: &AdvertisementData) {
        let _ = self.send(AppEvent::Advertisement(data.clone()));
    }

    fn service_available(&mut self, service: ServiceKind) {
        let _ = self.send(AppEvent::ServiceAvailable(service));
    }

    fn uart_received(&mut self, message: &str) {
        let _ = self.send(AppEvent::UartReceived(message.to_string()));
    }

    fn pin_values_updated(&mut self, values: &PinValues) {
        let _ = self.send(AppEvent::PinValuesUpdated(values.clone()));
    }

    fn microbit_event(&mut self, event: MicrobitEvent) {
        let _ = self.send(AppEvent::MicrobitEvent(event));
    }

    fn device_info_updated(&mut self, info: &DeviceInfo) {
        let _ = self.send(AppEvent::DeviceInfoUpdated(info.clone()));
    }

    fn state_changed(&mut self, state: ConnectionState) {
        let _ = self.send(AppEvent::StateChanged(state));
    }
}

/// Delegate that keeps every notification; clones share one list
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct RecordingDelegate {
    events: std::sync::Arc<std::sync::Mutex<Vec<AppEvent>>>,
}

#[cfg(test)]
impl RecordingDelegate {
    pub fn events(&self) -> Vec<AppEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Notifications other than log and state updates
    pub fn data_events(&self) -> Vec<AppEvent> {
        self.events()
            .into_iter()
            .filter(|event| {
                !matches!(event, AppEvent::LogUpdated(_) | AppEvent::StateChanged(_))
            })
            .collect()
    }

    pub fn services(&self) -> Vec<ServiceKind> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                AppEvent::ServiceAvailable(service) => Some(service),
                _ => None,
            })
            .collect()
    }

    pub fn last_log(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .rev()
            .find_map(|event| match event {
                AppEvent::LogUpdated(entries) => Some(entries),
                _ => None,
            })
            .unwrap_or_default()
    }

    fn push(&self, event: AppEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
impl SessionDelegate for RecordingDelegate {
    fn log_updated(&mut self, entries: Vec<String>) {
        self.push(AppEvent::LogUpdated(entries));
    }

    fn advertisement_data(&mut self, data: &AdvertisementData) {
        self.push(AppEvent::Advertisement(data.clone()));
    }

    fn service_available(&mut self, service: ServiceKind) {
        self.push(AppEvent::ServiceAvailable(service));
    }

    fn uart_received(&mut self, message: &str) {
        self.push(AppEvent::UartReceived(message.to_string()));
    }

    fn pin_values_updated(&mut self, values: &PinValues) {
        self.push(AppEvent::PinValuesUpdated(values.clone()));
    }

    fn microbit_event(&mut self, event: MicrobitEvent) {
        self.push(AppEvent::MicrobitEvent(event));
    }

    fn device_info_updated(&mut self, info: &DeviceInfo) {
        self.push(AppEvent::DeviceInfoUpdated(info.clone()));
    }

    fn state_changed(&mut self, state: ConnectionState) {
        self.push(AppEvent::StateChanged(state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_delegate_forwards_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut delegate = tx;
        delegate.service_available(ServiceKind::Uart);
        delegate.uart_received("hello");

        assert_eq!(
            rx.try_recv().unwrap(),
            AppEvent::ServiceAvailable(ServiceKind::Uart)
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            AppEvent::UartReceived("hello".to_string())
        );
    }

    #[test]
    fn test_channel_delegate_ignores_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut delegate: mpsc::UnboundedSender<AppEvent> = tx;
        delegate.state_changed(ConnectionState::Idle);
    }
}
