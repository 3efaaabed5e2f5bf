//! Endpoint dispatch from plugin requests to the driver

use crate::driver::TmpsyncDriver;
use crate::error::{TmpsyncError, TmpsyncResult};
use crate::plugin::protocol::{
    ActivateResponse, CapabilitiesResponse, Capability, CreateRequest, EmptyResponse,
    ErrorResponse, GetResponse, ListResponse, MountRequest, MountpointResponse, NameRequest,
    IMPLEMENTS,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// Status and JSON body returned for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl PluginResponse {
    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        let body = serde_json::to_vec(value)
            .unwrap_or_else(|e| format!(r#"{{"Err":"encoding response: {}"}}"#, e).into_bytes());
        Self { status, body }
    }

    fn error(status: u16, err: &TmpsyncError) -> Self {
        Self::json(
            status,
            &ErrorResponse {
                err: err.to_string(),
            },
        )
    }
}

fn parse<T: DeserializeOwned>(body: &[u8]) -> TmpsyncResult<T> {
    serde_json::from_slice(body).map_err(|e| TmpsyncError::Protocol(e.to_string()))
}

fn encode<T: Serialize>(value: T) -> TmpsyncResult<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}

/// Handle one request for `endpoint` (for example `/VolumeDriver.Mount`)
///
/// Every plugin endpoint is a `POST`; other methods get 405.
pub async fn handle(
    driver: &TmpsyncDriver,
    method: &str,
    endpoint: &str,
    body: &[u8],
) -> PluginResponse {
    debug!("{} {} {}", method, endpoint, String::from_utf8_lossy(body));

    if !method.eq_ignore_ascii_case("POST") {
        return PluginResponse::error(
            405,
            &TmpsyncError::Protocol(format!("method {} not allowed on {}", method, endpoint)),
        );
    }

    match dispatch(driver, endpoint, body).await {
        Some(Ok(value)) => PluginResponse::json(200, &value),
        Some(Err(e)) => {
            warn!("{} failed: {}", endpoint, e);
            let status = match &e {
                TmpsyncError::Protocol(_) => 400,
                _ => 500,
            };
            PluginResponse::error(status, &e)
        }
        None => PluginResponse::error(
            404,
            &TmpsyncError::Protocol(format!("unknown endpoint {}", endpoint)),
        ),
    }
}

async fn dispatch(
    driver: &TmpsyncDriver,
    endpoint: &str,
    body: &[u8],
) -> Option<TmpsyncResult<serde_json::Value>> {
    let result = match endpoint {
        "/Plugin.Activate" => encode(ActivateResponse {
            implements: vec![IMPLEMENTS],
        }),
        "/VolumeDriver.Create" => create(driver, body).await,
        "/VolumeDriver.Remove" => remove(driver, body).await,
        "/VolumeDriver.Path" => path(driver, body).await,
        "/VolumeDriver.Mount" => mount(driver, body).await,
        "/VolumeDriver.Unmount" => unmount(driver, body).await,
        "/VolumeDriver.Get" => get(driver, body).await,
        "/VolumeDriver.List" => encode(ListResponse {
            volumes: driver.list().await.into_iter().map(Into::into).collect(),
        }),
        "/VolumeDriver.Capabilities" => encode(CapabilitiesResponse {
            capabilities: Capability {
                scope: driver.capabilities().scope.to_string(),
            },
        }),
        _ => return None,
    };
    Some(result)
}

async fn create(driver: &TmpsyncDriver, body: &[u8]) -> TmpsyncResult<serde_json::Value> {
    let req: CreateRequest = parse(body)?;
    driver.create(&req.name, &req.opts.unwrap_or_default()).await?;
    encode(EmptyResponse {})
}

async fn remove(driver: &TmpsyncDriver, body: &[u8]) -> TmpsyncResult<serde_json::Value> {
    let req: NameRequest = parse(body)?;
    driver.remove(&req.name).await?;
    encode(EmptyResponse {})
}

async fn path(driver: &TmpsyncDriver, body: &[u8]) -> TmpsyncResult<serde_json::Value> {
    let req: NameRequest = parse(body)?;
    let mountpoint = driver.path(&req.name).await?;
    encode(MountpointResponse {
        mountpoint: mountpoint.display().to_string(),
    })
}

async fn mount(driver: &TmpsyncDriver, body: &[u8]) -> TmpsyncResult<serde_json::Value> {
    let req: MountRequest = parse(body)?;
    let mountpoint = driver.mount(&req.name, &req.id).await?;
    encode(MountpointResponse {
        mountpoint: mountpoint.display().to_string(),
    })
}

async fn unmount(driver: &TmpsyncDriver, body: &[u8]) -> TmpsyncResult<serde_json::Value> {
    let req: MountRequest = parse(body)?;
    driver.unmount(&req.name, &req.id).await?;
    encode(EmptyResponse {})
}

async fn get(driver: &TmpsyncDriver, body: &[u8]) -> TmpsyncResult<serde_json::Value> {
    let req: NameRequest = parse(body)?;
    let info = driver.get(&req.name).await?;
    encode(GetResponse {
        volume: info.into(),
    })
}
