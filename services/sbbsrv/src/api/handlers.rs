//! JSON API handlers

use std::time::Duration;

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use tracing::{debug, info};

use super::dto::{
    ApiResult, AppError, FrameResponse, HealthStatus, InfoResponse, InterfaceRequest,
    InterfaceResponse, LogLevelRequest, LogLevelResponse, ModuleAction, ModuleRequest,
    ScanRequest, ScanResponse, ServiceStatus,
};
use super::routes::AppState;
use crate::error::SbbError;

type ApiResponse<T> = Result<Json<ApiResult<T>>, AppError>;

/// Health check endpoint
///
/// @route GET /health
pub async fn health_check() -> Json<ApiResult<HealthStatus>> {
    ApiResult::new(HealthStatus {
        status: "ok".to_string(),
        service: "sbbsrv".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Bus and queue status
///
/// @route GET /status
pub async fn get_status(State(state): State<AppState>) -> Json<ApiResult<ServiceStatus>> {
    ApiResult::new(ServiceStatus {
        service: "sbbsrv".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started.elapsed().as_secs(),
        log_level: common::logging::get_log_level(),
        timing: state.config.timing.clone(),
        clock: state.config.clock.clone(),
        bus: state.client.status(),
    })
}

/// Send raw bytes and optionally collect an answer
///
/// @route POST /interface
/// @input `{"sendbytes": "FFC00509" | [255,192,5,9], "answerbytes"?: n}`
/// @output `{"result": {"answer": "<hex>"}}`
pub async fn post_interface(
    State(state): State<AppState>,
    payload: Result<Json<InterfaceRequest>, JsonRejection>,
) -> ApiResponse<InterfaceResponse> {
    let Json(request) = payload?;
    let bytes = request.sendbytes.to_bytes()?;
    debug!("API sendbytes: {}", common::hex::format_hex_spaced(&bytes));

    let answer = state.client.send_raw(bytes, request.answerbytes).await?;
    Ok(ApiResult::new(InterfaceResponse {
        answer: common::hex::encode_upper(&answer),
    }))
}

/// Set a module position or value, or query its info registers
///
/// @route POST /module
/// @input `{"addr", "pos"}` | `{"addr", "type", "value"}` | `{"addr", "info": true}`
pub async fn post_module(
    State(state): State<AppState>,
    payload: Result<Json<ModuleRequest>, JsonRejection>,
) -> Result<Json<ApiResult<serde_json::Value>>, AppError> {
    let Json(request) = payload?;
    let addr = request.addr;

    let result = match request.action()? {
        ModuleAction::Position(pos) => {
            let frame = state.client.set_position(addr, pos).await?;
            to_value(FrameResponse {
                frame: frame.to_string(),
            })?
        },
        ModuleAction::Value(module_type, value) => {
            let frame = state
                .client
                .set_module_value(addr, module_type, value)
                .await?;
            to_value(FrameResponse {
                frame: frame.to_string(),
            })?
        },
        ModuleAction::Info => {
            let info = state.client.query_info(addr).await?;
            to_value(InfoResponse { addr, info })?
        },
    };
    Ok(ApiResult::new(result))
}

/// Sweep an address range for responding modules
///
/// @route POST /scan
/// @input `{"from"?: 0, "to"?: 255, "timeout_ms"?: n}`
pub async fn post_scan(
    State(state): State<AppState>,
    payload: Result<Json<ScanRequest>, JsonRejection>,
) -> ApiResponse<ScanResponse> {
    let Json(request) = payload?;
    let from = request.from.unwrap_or(0);
    let to = request.to.unwrap_or(u8::MAX);
    if from > to {
        return Err(AppError::bad_request(format!(
            "Scan range is empty: from {from} > to {to}"
        )));
    }
    let timeout_ms = request
        .timeout_ms
        .unwrap_or(state.config.timing.scan_timeout_ms);
    if timeout_ms == 0 {
        return Err(AppError::bad_request("timeout_ms must be > 0"));
    }

    let modules = state
        .client
        .scan(from..=to, Duration::from_millis(timeout_ms))
        .await?;
    Ok(ApiResult::new(ScanResponse { modules }))
}

/// Change the log filter at runtime
///
/// @route PUT /loglevel
pub async fn put_log_level(
    payload: Result<Json<LogLevelRequest>, JsonRejection>,
) -> ApiResponse<LogLevelResponse> {
    let Json(request) = payload?;
    let level = crate::core::bootstrap::normalize_log_level(&request.level);
    common::logging::set_log_level(&level).map_err(AppError::bad_request)?;
    info!("Log level set to '{level}' via API");
    Ok(ApiResult::new(LogLevelResponse { level }))
}

fn to_value<T: serde::Serialize>(value: T) -> Result<serde_json::Value, AppError> {
    serde_json::to_value(value)
        .map_err(|e| SbbError::internal(format!("Failed to encode response: {e}")).into())
}
