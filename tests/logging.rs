//! Logger installation. Runs in its own process, so no other test has
//! installed a global subscriber first.

use microbit_ble::domain::settings::LogSettings;
use microbit_ble::init_logger;

#[test]
fn init_logger_installs_once() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().join("logs");
    let settings = LogSettings {
        console_logging_enabled: false,
        file_logging_enabled: true,
        log_dir: log_dir.to_string_lossy().into_owned(),
        ..Default::default()
    };

    let guard = init_logger(&settings).expect("first install succeeds");
    assert!(log_dir.is_dir());

    let second = init_logger(&settings);
    assert!(second.is_err());

    drop(guard);
}
