//! micro:bit Service Module
//!
//! Runs a [`MicrobitSession`] on a tokio task. Radio callbacks and application
//! commands arrive on separate channels and are applied one at a time, so the
//! session never sees two callbacks at once. Discovery deadlines are armed
//! here from [`DiscoveryTimeouts`].

use crate::domain::models::{ConnectionState, EventKind, PinConfig, PinValues};
use crate::domain::settings::{DiscoveryTimeouts, Settings};
use crate::error::SessionError;
use crate::infrastructure::bluetooth::connection::{MicrobitSession, SessionConfig};
use crate::infrastructure::bluetooth::delegate::SessionDelegate;
use crate::infrastructure::bluetooth::radio::{RadioEvent, RadioStack};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, error, info, warn};

/// Commands accepted by the service task
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    StartScanning,
    StopScanning,
    Disconnect,
    SendUart(String),
    ConfigurePinsAnalogue(PinConfig),
    ConfigurePinsReadWrite(PinConfig),
    SetPinValues(PinValues),
    RegisterEvents(Vec<u16>),
    RaiseEvent(EventKind, u16),
    Shutdown,
}

struct Request {
    command: SessionCommand,
    reply: oneshot::Sender<Result<(), SessionError>>,
}

/// Cloneable front end of a running [`MicrobitService`]
#[derive(Debug, Clone)]
pub struct MicrobitHandle {
    commands: mpsc::UnboundedSender<Request>,
    radio_events: mpsc::UnboundedSender<RadioEvent>,
}

impl MicrobitHandle {
    /// Sender for the platform adapter to deliver radio callbacks on
    pub fn radio_events(&self) -> mpsc::UnboundedSender<RadioEvent> {
        self.radio_events.clone()
    }

    pub fn push_radio_event(&self, event: RadioEvent) -> Result<(), SessionError> {
        self.radio_events
            .send(event)
            .map_err(|_| SessionError::ServiceStopped)
    }

    pub async fn start_scanning(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::StartScanning).await
    }

    pub async fn stop_scanning(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::StopScanning).await
    }

    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::Disconnect).await
    }

    pub async fn send_uart(&self, message: impl Into<String>) -> Result<(), SessionError> {
        self.request(SessionCommand::SendUart(message.into())).await
    }

    pub async fn configure_pins_analogue(&self, config: PinConfig) -> Result<(), SessionError> {
        self.request(SessionCommand::ConfigurePinsAnalogue(config)).await
    }

    pub async fn configure_pins_read_write(&self, config: PinConfig) -> Result<(), SessionError> {
        self.request(SessionCommand::ConfigurePinsReadWrite(config)).await
    }

    pub async fn set_pin_values(&self, values: PinValues) -> Result<(), SessionError> {
        self.request(SessionCommand::SetPinValues(values)).await
    }

    pub async fn register_events(&self, event_ids: Vec<u16>) -> Result<(), SessionError> {
        self.request(SessionCommand::RegisterEvents(event_ids)).await
    }

    pub async fn raise_event(&self, kind: EventKind, value: u16) -> Result<(), SessionError> {
        self.request(SessionCommand::RaiseEvent(kind, value)).await
    }

    /// Stop the service task. Later calls fail with `ServiceStopped`.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::Shutdown).await
    }

    async fn request(&self, command: SessionCommand) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Request { command, reply })
            .map_err(|_| SessionError::ServiceStopped)?;
        response.await.map_err(|_| SessionError::ServiceStopped)?
    }
}

/// Deadline for the state entered at `epoch`
#[derive(Debug, Clone, Copy)]
struct StageDeadline {
    epoch: u64,
    at: Option<Instant>,
}

pub struct MicrobitService<R, D> {
    session: MicrobitSession<R, D>,
    timeouts: DiscoveryTimeouts,
    commands: mpsc::UnboundedReceiver<Request>,
    radio_events: mpsc::UnboundedReceiver<RadioEvent>,
}

impl<R, D> MicrobitService<R, D>
where
    R: RadioStack + Send + 'static,
    D: SessionDelegate + Send + 'static,
{
    pub fn new(radio: R, delegate: D, settings: &Settings) -> (Self, MicrobitHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (radio_tx, radio_rx) = mpsc::unbounded_channel();

        let service = Self {
            session: MicrobitSession::new(radio, delegate, SessionConfig::from(settings)),
            timeouts: settings.discovery_timeouts,
            commands: command_rx,
            radio_events: radio_rx,
        };
        let handle = MicrobitHandle {
            commands: command_tx,
            radio_events: radio_tx,
        };
        (service, handle)
    }

    /// Create the service and run it on the current tokio runtime
    pub fn spawn(radio: R, delegate: D, settings: &Settings) -> (MicrobitHandle, JoinHandle<()>) {
        let (service, handle) = Self::new(radio, delegate, settings);
        let task = tokio::spawn(service.run());
        (handle, task)
    }

    pub async fn run(mut self) {
        info!(
            "micro:bit service started, looking for {}",
            self.session.config().device_name
        );

        let mut deadline = self.deadline_for_current_stage();
        let mut radio_open = true;

        loop {
            if deadline.epoch != self.session.epoch() {
                deadline = self.deadline_for_current_stage();
            }

            let expiry = async move {
                match deadline.at {
                    Some(at) => time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;

                event = self.radio_events.recv(), if radio_open => match event {
                    Some(event) => self.session.handle_event(event),
                    None => {
                        warn!("Radio event channel closed");
                        radio_open = false;
                    }
                },
                request = self.commands.recv() => match request {
                    Some(Request { command: SessionCommand::Shutdown, reply }) => {
                        let _ = reply.send(Ok(()));
                        break;
                    }
                    Some(Request { command, reply }) => {
                        let result = self.execute(command);
                        let _ = reply.send(result);
                    }
                    None => {
                        debug!("All handles dropped");
                        break;
                    }
                },
                _ = expiry => {
                    debug!("Stage deadline reached in {:?}", self.session.state());
                    self.session.stage_timed_out(deadline.epoch);
                    deadline.at = None;
                }
            }
        }

        info!("micro:bit service stopped");
    }

    fn execute(&mut self, command: SessionCommand) -> Result<(), SessionError> {
        debug!("Executing {:?}", command);
        let result = match command {
            SessionCommand::StartScanning => self.session.start_scanning(),
            SessionCommand::StopScanning => self.session.stop_scanning(),
            SessionCommand::Disconnect => self.session.disconnect(),
            SessionCommand::SendUart(message) => self.session.send_uart(&message),
            SessionCommand::ConfigurePinsAnalogue(config) => {
                self.session.configure_pins_analogue(&config)
            }
            SessionCommand::ConfigurePinsReadWrite(config) => {
                self.session.configure_pins_read_write(&config)
            }
            SessionCommand::SetPinValues(values) => self.session.set_pin_values(&values),
            SessionCommand::RegisterEvents(ids) => self.session.register_events(&ids),
            SessionCommand::RaiseEvent(kind, value) => self.session.raise_event(kind, value),
            SessionCommand::Shutdown => Ok(()),
        };

        if let Err(e) = &result {
            error!("Command failed: {}", e);
        }
        result
    }

    fn deadline_for_current_stage(&self) -> StageDeadline {
        let limit: Option<Duration> = match self.session.state() {
            ConnectionState::Connecting => self.timeouts.connect(),
            ConnectionState::DiscoveringServices => self.timeouts.service_discovery(),
            ConnectionState::DiscoveringCharacteristics { .. } => {
                self.timeouts.characteristic_discovery()
            }
            _ => None,
        };
        StageDeadline {
            epoch: self.session.epoch(),
            at: limit.map(|limit| Instant::now() + limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::AppEvent;
    use crate::infrastructure::bluetooth::delegate::RecordingDelegate;
    use crate::infrastructure::bluetooth::radio::{
        PeripheralHandle, RadioRequest, RecordingRadio, ScanResult, ServiceHandle,
    };

    const NAME: &str = "BBC micro:bit [zuvog]";
    const PERIPHERAL: PeripheralHandle = PeripheralHandle(3);

    fn settings(timeouts: DiscoveryTimeouts) -> Settings {
        Settings {
            device_name: NAME.to_string(),
            discovery_timeouts: timeouts,
            ..Default::default()
        }
    }

    fn start(
        timeouts: DiscoveryTimeouts,
    ) -> (MicrobitHandle, JoinHandle<()>, RecordingRadio, RecordingDelegate) {
        let radio = RecordingRadio::default();
        let delegate = RecordingDelegate::default();
        let (handle, task) =
            MicrobitService::spawn(radio.clone(), delegate.clone(), &settings(timeouts));
        (handle, task, radio, delegate)
    }

    fn target_seen() -> RadioEvent {
        RadioEvent::ScanResult(ScanResult {
            peripheral: PERIPHERAL,
            local_name: Some(NAME.to_string()),
            ..Default::default()
        })
    }

    async fn scan_until_connecting(handle: &MicrobitHandle) {
        handle
            .push_radio_event(RadioEvent::PowerStateChanged { powered_on: true })
            .unwrap();
        handle.start_scanning().await.unwrap();
        handle.push_radio_event(target_seen()).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_report_session_errors() {
        let (handle, _task, radio, _) = start(DiscoveryTimeouts::disabled());

        assert_eq!(
            handle.start_scanning().await,
            Err(SessionError::RadioUnavailable)
        );

        handle
            .push_radio_event(RadioEvent::PowerStateChanged { powered_on: true })
            .unwrap();
        assert_eq!(handle.start_scanning().await, Ok(()));
        assert_eq!(
            handle.send_uart("hello").await,
            Err(SessionError::PeripheralAbsent)
        );
        assert_eq!(
            handle.register_events(vec![0xFFFF]).await,
            Err(SessionError::InvalidEventId(0xFFFF))
        );
        assert_eq!(radio.requests(), vec![RadioRequest::Scan]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_deadline_cancels() {
        let (handle, _task, radio, delegate) = start(DiscoveryTimeouts {
            connect_ms: 1_000,
            service_discovery_ms: 0,
            characteristic_discovery_ms: 0,
        });
        scan_until_connecting(&handle).await;

        time::sleep(Duration::from_millis(999)).await;
        assert!(!radio
            .requests()
            .contains(&RadioRequest::CancelConnection(PERIPHERAL)));

        time::sleep(Duration::from_millis(10)).await;
        assert!(radio
            .requests()
            .contains(&RadioRequest::CancelConnection(PERIPHERAL)));
        assert_eq!(
            delegate.events().last(),
            Some(&AppEvent::StateChanged(ConnectionState::Disconnected))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_rearms_deadline() {
        let (handle, _task, radio, delegate) = start(DiscoveryTimeouts {
            connect_ms: 1_000,
            service_discovery_ms: 0,
            characteristic_discovery_ms: 1_000,
        });
        scan_until_connecting(&handle).await;

        time::sleep(Duration::from_millis(500)).await;
        handle
            .push_radio_event(RadioEvent::Connected {
                peripheral: PERIPHERAL,
            })
            .unwrap();

        // Service discovery has no deadline
        time::sleep(Duration::from_secs(30)).await;
        assert!(!radio
            .requests()
            .contains(&RadioRequest::CancelConnection(PERIPHERAL)));

        handle
            .push_radio_event(RadioEvent::ServicesDiscovered {
                peripheral: PERIPHERAL,
                services: Ok(vec![ServiceHandle(1), ServiceHandle(2)]),
            })
            .unwrap();
        time::sleep(Duration::from_millis(1_100)).await;

        assert_eq!(
            delegate.events().last(),
            Some(&AppEvent::StateChanged(ConnectionState::Bound))
        );
        assert!(!radio
            .requests()
            .contains(&RadioRequest::CancelConnection(PERIPHERAL)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_service() {
        let (handle, task, _, _) = start(DiscoveryTimeouts::default());
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert_eq!(
            handle.stop_scanning().await,
            Err(SessionError::ServiceStopped)
        );
        assert_eq!(
            handle.push_radio_event(RadioEvent::PowerStateChanged { powered_on: true }),
            Err(SessionError::ServiceStopped)
        );
    }

    #[tokio::test]
    async fn test_channel_delegate_end_to_end() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (handle, _task) = MicrobitService::spawn(
            RecordingRadio::default(),
            tx,
            &settings(DiscoveryTimeouts::disabled()),
        );
        handle
            .push_radio_event(RadioEvent::PowerStateChanged { powered_on: true })
            .unwrap();
        handle.start_scanning().await.unwrap();

        let mut saw_scanning = false;
        while let Ok(event) = rx.try_recv() {
            if event == AppEvent::StateChanged(ConnectionState::Scanning) {
                saw_scanning = true;
            }
        }
        assert!(saw_scanning);
    }
}
