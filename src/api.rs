//! JSON envelopes returned to callers. Every failure carries `success: false`
//! and a human-readable `error`.

use serde::Serialize;
use serde_json::Value;

use crate::catalog::{self, PingTargets, SPEEDTEST_SERVERS};
use crate::error::Error;
use crate::history::HistoryService;
use crate::lookup::{LookupRequest, LookupService};
use crate::types::{HistoryEntry, NormalizedIpRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None, ip: None }
    }

    pub fn failure(error: &Error) -> Self {
        Self { success: false, data: None, error: Some(error.to_string()), ip: None }
    }

    pub fn with_ip(mut self, ip: Option<String>) -> Self {
        self.ip = ip;
        self
    }
}

impl ApiResponse<()> {
    pub fn done() -> Self {
        Self { success: true, data: None, error: None, ip: None }
    }
}

impl<T> From<crate::Result<T>> for ApiResponse<T> {
    fn from(result: crate::Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::failure(&e),
        }
    }
}

/// Lookup failures echo the requested address, when there was one.
pub async fn ipinfo(service: &LookupService, request: &LookupRequest) -> ApiResponse<NormalizedIpRecord> {
    match service.lookup(request).await {
        Ok(record) => ApiResponse::ok(record),
        Err(e) => {
            log::warn!("[api] ipinfo_failed: ip={:?} error={}", request.ip, e);
            ApiResponse::failure(&e).with_ip(request.ip.clone().filter(|ip| !ip.trim().is_empty()))
        }
    }
}

pub async fn save_history(history: &HistoryService, payload: Value) -> ApiResponse<()> {
    match history.save_value(payload).await {
        Ok(_) => ApiResponse::done(),
        Err(e) => ApiResponse::failure(&e),
    }
}

pub async fn history(history: &HistoryService) -> ApiResponse<Vec<HistoryEntry>> {
    history.read().await.into()
}

/// `data` is the number of deleted keys.
pub async fn clear_history(history: &HistoryService) -> ApiResponse<usize> {
    history.clear().await.into()
}

pub fn ping_targets() -> PingTargets {
    PingTargets::default()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerListing {
    pub success: bool,
    pub servers: Vec<ServerInfo>,
}

pub fn speedtest_servers() -> ServerListing {
    ServerListing {
        success: true,
        servers: SPEEDTEST_SERVERS
            .iter()
            .map(|s| ServerInfo { id: s.id, name: s.name, size: s.size })
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeedtestUrl {
    pub success: bool,
    pub url: &'static str,
    pub name: &'static str,
    pub size: u64,
}

pub fn speedtest_url(server_id: Option<&str>) -> SpeedtestUrl {
    let server = catalog::find_server(server_id);
    SpeedtestUrl { success: true, url: server.url, name: server.name, size: server.size }
}
