//! Volume plugin wire types
//!
//! Field names follow the Docker volume plugin protocol.

use crate::driver::VolumeInfo;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Content type of every plugin response
pub const CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1+json";

/// Plugin subsystem implemented by this driver
pub const IMPLEMENTS: &str = "VolumeDriver";

/// `/VolumeDriver.Create` request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateRequest {
    pub name: String,
    #[serde(default)]
    pub opts: Option<HashMap<String, String>>,
}

/// Request carrying only a volume name (Remove, Path, Get)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NameRequest {
    pub name: String,
}

/// `/VolumeDriver.Mount` and `/VolumeDriver.Unmount` request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MountRequest {
    pub name: String,
    #[serde(default, rename = "ID")]
    pub id: String,
}

/// Error body
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    #[serde(rename = "Err")]
    pub err: String,
}

/// Empty success body
#[derive(Debug, Clone, Serialize)]
pub struct EmptyResponse {}

/// `/Plugin.Activate` response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActivateResponse {
    pub implements: Vec<&'static str>,
}

/// Path and Mount response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MountpointResponse {
    pub mountpoint: String,
}

/// One volume in Get and List responses
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeEntry {
    pub name: String,
    pub mountpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl From<VolumeInfo> for VolumeEntry {
    fn from(info: VolumeInfo) -> Self {
        Self {
            name: info.name,
            mountpoint: info.mountpoint.display().to_string(),
            created_at: info.created_at.map(|at| at.to_rfc3339()),
        }
    }
}

/// `/VolumeDriver.Get` response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetResponse {
    pub volume: VolumeEntry,
}

/// `/VolumeDriver.List` response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListResponse {
    pub volumes: Vec<VolumeEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Capability {
    pub scope: String,
}

/// `/VolumeDriver.Capabilities` response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CapabilitiesResponse {
    pub capabilities: Capability,
}
