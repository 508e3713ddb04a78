// NEP Gateway - DNS interception, HTTP ingress and exposition
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Home Assistant MQTT discovery documents
//!
//! One power sensor per inverter. The document is a fixed template with
//! the serial number substituted; it is rebuilt on every publish.

use nepserver::SerialNumber;
use serde::Serialize;

use crate::config::BridgeConfig;
use crate::error::Result;

/// Discovery document for one inverter's power sensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryDescriptor {
    pub name: String,
    pub unique_id: String,
    pub object_id: String,
    pub state_topic: String,
    pub unit_of_measurement: &'static str,
    pub device_class: &'static str,
    pub state_class: &'static str,
    pub icon: &'static str,
    /// Seconds
    pub expire_after: u64,
    pub device: DeviceInfo,
}

/// Device block grouping the sensor in Home Assistant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<String>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
}

impl DiscoveryDescriptor {
    /// Render the template for a device
    pub fn render(serial_number: &SerialNumber, config: &BridgeConfig) -> Self {
        let node_id = node_id(serial_number, config);
        Self {
            name: "Power".to_string(),
            unique_id: format!("{}_watt", node_id),
            object_id: format!("{}_watt", node_id),
            state_topic: state_topic(serial_number, config),
            unit_of_measurement: "W",
            device_class: "power",
            state_class: "measurement",
            icon: "mdi:solar-power",
            expire_after: config.expire_after.as_secs(),
            device: DeviceInfo {
                identifiers: vec![node_id],
                name: format!("Inverter {}", serial_number),
                manufacturer: config.manufacturer.clone(),
                model: config.model.clone(),
            },
        }
    }

    /// JSON payload
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// `<prefix>_<serial>`, stable per device
pub fn node_id(serial_number: &SerialNumber, config: &BridgeConfig) -> String {
    format!("{}_{}", config.topic_prefix, serial_number)
}

/// Retained wattage topic
pub fn state_topic(serial_number: &SerialNumber, config: &BridgeConfig) -> String {
    format!("{}/{}/watt", config.topic_prefix, serial_number)
}

/// Retained discovery topic
pub fn config_topic(serial_number: &SerialNumber, config: &BridgeConfig) -> String {
    format!(
        "{}/sensor/{}/watt/config",
        config.discovery_prefix,
        node_id(serial_number, config)
    )
}

/// Diagnostic topic carrying every raw frame as hex
pub fn raw_topic(config: &BridgeConfig) -> String {
    format!("{}/raw", config.topic_prefix)
}
