//! Device selection among scan results

use super::DeviceInfo;
use crate::error::{BridgeError, Result};

/// How to choose the peripheral once scanning is done
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSelector {
    /// Match on hardware address, case-insensitive
    pub address: Option<String>,
    /// Match on exact advertised name
    pub name: Option<String>,
    /// Fallback position in discovery order
    pub index: usize,
}

impl DeviceSelector {
    /// Pick a device, returning its position in `devices`
    ///
    /// Address takes precedence over name, name over index.
    ///
    /// # Errors
    ///
    /// - `NoDevicesFound`: `devices` is empty
    /// - `DeviceNotFound`: nothing matches the address, name or index
    ///
    /// # Examples
    ///
    /// ```
    /// use ble_uart_bridge::ble::{DeviceInfo, DeviceSelector};
    ///
    /// let devices = vec![
    ///     DeviceInfo { id: "a".into(), name: Some("Left".into()), address: None },
    ///     DeviceInfo { id: "b".into(), name: Some("Right".into()), address: None },
    /// ];
    /// let selector = DeviceSelector { name: Some("Right".into()), ..Default::default() };
    /// assert_eq!(selector.select(&devices).unwrap(), 1);
    /// ```
    pub fn select(&self, devices: &[DeviceInfo]) -> Result<usize> {
        if devices.is_empty() {
            return Err(BridgeError::NoDevicesFound);
        }

        if let Some(address) = &self.address {
            return devices
                .iter()
                .position(|d| {
                    d.address
                        .as_deref()
                        .is_some_and(|a| a.eq_ignore_ascii_case(address))
                })
                .ok_or_else(|| BridgeError::DeviceNotFound(format!("address {}", address)));
        }

        if let Some(name) = &self.name {
            return devices
                .iter()
                .position(|d| d.name.as_deref() == Some(name.as_str()))
                .ok_or_else(|| BridgeError::DeviceNotFound(format!("name {}", name)));
        }

        if self.index < devices.len() {
            Ok(self.index)
        } else {
            Err(BridgeError::DeviceNotFound(format!(
                "index {} (only {} found)",
                self.index,
                devices.len()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices() -> Vec<DeviceInfo> {
        vec![
            DeviceInfo {
                id: "0".to_string(),
                name: None,
                address: Some("AA:BB:CC:DD:EE:01".to_string()),
            },
            DeviceInfo {
                id: "1".to_string(),
                name: Some("Hatch".to_string()),
                address: Some("AA:BB:CC:DD:EE:02".to_string()),
            },
            DeviceInfo { id: "2".to_string(), name: Some("hatch".to_string()), address: None },
        ]
    }

    #[test]
    fn test_default_selects_first() {
        assert_eq!(DeviceSelector::default().select(&devices()).unwrap(), 0);
    }

    #[test]
    fn test_select_by_index() {
        let selector = DeviceSelector { index: 2, ..Default::default() };
        assert_eq!(selector.select(&devices()).unwrap(), 2);

        let selector = DeviceSelector { index: 3, ..Default::default() };
        assert!(matches!(selector.select(&devices()), Err(BridgeError::DeviceNotFound(_))));
    }

    #[test]
    fn test_select_by_address_ignores_case() {
        let selector = DeviceSelector {
            address: Some("aa:bb:cc:dd:ee:02".to_string()),
            ..Default::default()
        };
        assert_eq!(selector.select(&devices()).unwrap(), 1);
    }

    #[test]
    fn test_select_by_name_is_case_sensitive() {
        let selector = DeviceSelector { name: Some("hatch".to_string()), ..Default::default() };
        assert_eq!(selector.select(&devices()).unwrap(), 2);

        let selector = DeviceSelector { name: Some("HATCH".to_string()), ..Default::default() };
        assert!(selector.select(&devices()).is_err());
    }

    #[test]
    fn test_address_takes_precedence_over_name() {
        let selector = DeviceSelector {
            address: Some("AA:BB:CC:DD:EE:01".to_string()),
            name: Some("Hatch".to_string()),
            index: 2,
        };
        assert_eq!(selector.select(&devices()).unwrap(), 0);
    }

    #[test]
    fn test_empty_scan_result() {
        assert!(matches!(
            DeviceSelector::default().select(&[]),
            Err(BridgeError::NoDevicesFound)
        ));
    }
}
