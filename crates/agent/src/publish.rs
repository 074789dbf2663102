//! JSON payload written to stdout after a pass

use anyhow::Result;
use serde::Serialize;
use std::io::Write;
use telemetry_lib::EntityStore;

pub const INTEGRATION_NAME: &str = "com.kube-telemetry.kubernetes";
pub const PROTOCOL_VERSION: &str = "2";

#[derive(Debug, Serialize)]
pub struct Payload<'a> {
    name: &'static str,
    protocol_version: &'static str,
    integration_version: &'a str,
    data: &'a EntityStore,
}

impl<'a> Payload<'a> {
    pub fn new(integration_version: &'a str, data: &'a EntityStore) -> Self {
        Self {
            name: INTEGRATION_NAME,
            protocol_version: PROTOCOL_VERSION,
            integration_version,
            data,
        }
    }

    /// Write the payload as a single line of JSON
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        serde_json::to_writer(&mut writer, self)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}
