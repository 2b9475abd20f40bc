//! BLE Scanner Module
//!
//! Target matching and Eddystone inspection for scan results. Both run on
//! every scan result and do not depend on each other.

use crate::domain::models::AdvertisementData;
use crate::error::DecodeError;
use crate::infrastructure::bluetooth::codec::{self, EddystoneFrame};
use crate::infrastructure::bluetooth::protocol::EDDYSTONE_SERVICE_UUID;
use crate::infrastructure::bluetooth::radio::ScanResult;

/// True when the advertised local name is exactly `target_name`
pub fn is_target(scan: &ScanResult, target_name: &str) -> bool {
    scan.local_name.as_deref() == Some(target_name)
}

/// Human-readable name for log lines
pub fn display_name(scan: &ScanResult) -> &str {
    match scan.local_name.as_deref() {
        Some(name) if !name.is_empty() => name,
        _ => "Unknown",
    }
}

/// Eddystone service data found in one scan result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EddystoneSighting {
    pub raw: Vec<u8>,
    pub frame: Result<EddystoneFrame, DecodeError>,
    pub signal_strength: i16,
}

impl EddystoneSighting {
    /// Decoded fields for the delegate, `None` if the frame was malformed
    pub fn advertisement_data(&self) -> Option<AdvertisementData> {
        let frame = self.frame.as_ref().ok()?;
        let mut data = AdvertisementData {
            signal_strength: self.signal_strength,
            ..Default::default()
        };
        match frame {
            EddystoneFrame::Url(url) => data.url = Some(url.clone()),
            EddystoneFrame::Uid {
                namespace,
                instance,
            } => {
                data.namespace = Some(*namespace);
                data.instance = Some(*instance);
            }
        }
        Some(data)
    }

    /// One-line summary for the diagnostic log
    pub fn describe(&self) -> String {
        let raw = codec::to_hex(&self.raw);
        match &self.frame {
            Ok(EddystoneFrame::Url(url)) => format!(
                "Eddystone URL frame {} url={} rssi={}",
                raw, url, self.signal_strength
            ),
            Ok(EddystoneFrame::Uid {
                namespace,
                instance,
            }) => format!(
                "Eddystone UID frame {} namespace={:#018X} instance={:#010X} rssi={}",
                raw, namespace, instance, self.signal_strength
            ),
            Err(e) => format!("Malformed Eddystone frame {} ({})", raw, e),
        }
    }
}

/// Inspect the Eddystone service data of a scan result, if any
pub fn analyze_advertisement(scan: &ScanResult) -> Option<EddystoneSighting> {
    let raw = scan.service_data.get(&EDDYSTONE_SERVICE_UUID)?;
    Some(EddystoneSighting {
        raw: raw.clone(),
        frame: codec::decode_eddystone(raw),
        signal_strength: scan.signal_strength,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::protocol::{uuid_from_u16, UART_SERVICE_UUID};
    use crate::infrastructure::bluetooth::radio::PeripheralHandle;

    fn scan_with(service_data: Vec<(uuid::Uuid, Vec<u8>)>) -> ScanResult {
        ScanResult {
            peripheral: PeripheralHandle(1),
            local_name: Some("beacon".to_string()),
            service_data: service_data.into_iter().collect(),
            signal_strength: -61,
        }
    }

    #[test]
    fn test_target_match_is_exact() {
        let mut scan = scan_with(Vec::new());
        scan.local_name = Some("BBC micro:bit [abcde]".to_string());
        assert!(is_target(&scan, "BBC micro:bit [abcde]"));
        assert!(!is_target(&scan, "BBC micro:bit"));

        scan.local_name = None;
        assert!(!is_target(&scan, "BBC micro:bit [abcde]"));
        assert_eq!(display_name(&scan), "Unknown");
    }

    #[test]
    fn test_url_sighting() {
        let mut payload = vec![0x10, 0xEB];
        payload.extend_from_slice(b"goo.gl/xyz");
        let sighting = analyze_advertisement(&scan_with(vec![(EDDYSTONE_SERVICE_UUID, payload)]))
            .unwrap();

        let data = sighting.advertisement_data().unwrap();
        assert_eq!(data.url.as_deref(), Some("goo.gl/xyz"));
        assert_eq!(data.namespace, None);
        assert_eq!(data.signal_strength, -61);
        assert!(sighting.describe().starts_with("Eddystone URL frame 10EB"));
    }

    #[test]
    fn test_uid_sighting() {
        let mut payload = vec![0u8; 18];
        payload[4..12].copy_from_slice(&7u64.to_be_bytes());
        payload[14..18].copy_from_slice(&9u32.to_be_bytes());
        let sighting = analyze_advertisement(&scan_with(vec![(EDDYSTONE_SERVICE_UUID, payload)]))
            .unwrap();

        let data = sighting.advertisement_data().unwrap();
        assert_eq!(data.namespace, Some(7));
        assert_eq!(data.instance, Some(9));
        assert_eq!(data.url, None);
    }

    #[test]
    fn test_malformed_sighting_is_not_forwarded() {
        let sighting =
            analyze_advertisement(&scan_with(vec![(EDDYSTONE_SERVICE_UUID, vec![0x00, 0x01])]))
                .unwrap();
        assert!(sighting.advertisement_data().is_none());
        assert!(sighting.describe().starts_with("Malformed Eddystone frame 0001"));
    }

    #[test]
    fn test_other_service_data_is_ignored() {
        let scan = scan_with(vec![
            (UART_SERVICE_UUID, vec![1, 2, 3]),
            (uuid_from_u16(0xfe9f), vec![0x10, 0x00]),
        ]);
        assert!(analyze_advertisement(&scan).is_none());
    }
}
