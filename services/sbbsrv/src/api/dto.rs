//! API request and response types
//!
//! Every response is either `{"result": ...}` or `{"error": "..."}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::config::TimingConfig;
use crate::core::transceiver::TransceiverStatus;
use crate::error::SbbError;
use crate::protocol::ModuleType;
use crate::service::{ClockConfig, InfoReading, ScanHit};

/// Success envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResult<T> {
    pub result: T,
}

impl<T> ApiResult<T> {
    pub fn new(result: T) -> Json<Self> {
        Json(Self { result })
    }
}

/// Error with HTTP status, rendered as `{"error": message}`
#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<SbbError> for AppError {
    fn from(err: SbbError) -> Self {
        let status = match &err {
            SbbError::FrameBuild(_) | SbbError::ValidationError(_) => StatusCode::BAD_REQUEST,
            SbbError::ConnectionError(_) => StatusCode::SERVICE_UNAVAILABLE,
            SbbError::ResponseTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            SbbError::ConfigError(_) | SbbError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        };
        Self::new(status, err.to_string())
    }
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

/// Bytes given either as hex text or as an array of integers
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum BytePayload {
    Hex(String),
    Array(Vec<i64>),
}

impl BytePayload {
    pub fn to_bytes(&self) -> Result<Vec<u8>, SbbError> {
        match self {
            BytePayload::Hex(text) => Ok(common::hex::decode(text)?),
            BytePayload::Array(values) => values
                .iter()
                .map(|v| {
                    u8::try_from(*v)
                        .map_err(|_| SbbError::validation(format!("Byte value {v} out of range")))
                })
                .collect(),
        }
    }
}

/// `POST /interface`
#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceRequest {
    pub sendbytes: BytePayload,
    #[serde(default)]
    pub answerbytes: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceResponse {
    pub answer: String,
}

/// Module value: a number or a single character
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ModuleValue {
    Number(i64),
    Text(String),
}

impl ModuleValue {
    pub fn to_code(&self) -> Result<i64, SbbError> {
        match self {
            ModuleValue::Number(n) => Ok(*n),
            ModuleValue::Text(text) => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(i64::from(u32::from(c))),
                    _ => Err(SbbError::validation(format!(
                        "Module value '{text}' must be a number or a single character"
                    ))),
                }
            },
        }
    }
}

/// `POST /module`
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleRequest {
    pub addr: u8,
    #[serde(default)]
    pub pos: Option<u8>,
    #[serde(default, rename = "type")]
    pub module_type: Option<ModuleType>,
    #[serde(default)]
    pub value: Option<ModuleValue>,
    #[serde(default)]
    pub info: bool,
}

/// What a [`ModuleRequest`] asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleAction {
    Position(u8),
    Value(ModuleType, i64),
    Info,
}

impl ModuleRequest {
    pub fn action(&self) -> Result<ModuleAction, SbbError> {
        if self.info {
            return Ok(ModuleAction::Info);
        }
        match (self.module_type, &self.value, self.pos) {
            (Some(module_type), Some(value), _) => {
                Ok(ModuleAction::Value(module_type, value.to_code()?))
            },
            (Some(_), None, _) => Err(SbbError::validation("'type' requires a 'value'")),
            (None, _, Some(pos)) => Ok(ModuleAction::Position(pos)),
            _ => Err(SbbError::validation(
                "Module request needs 'pos', 'type' with 'value', or 'info'",
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameResponse {
    pub frame: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResponse {
    pub addr: u8,
    pub info: Vec<InfoReading>,
}

/// `POST /scan`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub from: Option<u8>,
    #[serde(default)]
    pub to: Option<u8>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanResponse {
    pub modules: Vec<ScanHit>,
}

/// `PUT /loglevel`
#[derive(Debug, Clone, Deserialize)]
pub struct LogLevelRequest {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLevelResponse {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub service: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub log_level: String,
    pub timing: TimingConfig,
    pub clock: ClockConfig,
    pub bus: TransceiverStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_payload_forms() {
        let hex: BytePayload = serde_json::from_str(r#""ff c0 05 09""#).unwrap();
        assert_eq!(hex.to_bytes().unwrap(), vec![0xFF, 0xC0, 0x05, 0x09]);

        let array: BytePayload = serde_json::from_str("[255, 192, 5, 9]").unwrap();
        assert_eq!(array.to_bytes().unwrap(), vec![0xFF, 0xC0, 0x05, 0x09]);

        let bad: BytePayload = serde_json::from_str("[256]").unwrap();
        assert!(bad.to_bytes().is_err());
        let bad: BytePayload = serde_json::from_str(r#""FFC""#).unwrap();
        assert!(bad.to_bytes().is_err());
    }

    #[test]
    fn test_module_actions() {
        let req: ModuleRequest = serde_json::from_str(r#"{"addr": 5, "pos": 12}"#).unwrap();
        assert_eq!(req.action().unwrap(), ModuleAction::Position(12));

        let req: ModuleRequest =
            serde_json::from_str(r#"{"addr": 5, "type": "hour", "value": 9}"#).unwrap();
        assert_eq!(req.action().unwrap(), ModuleAction::Value(ModuleType::Hour, 9));

        let req: ModuleRequest =
            serde_json::from_str(r#"{"addr": 7, "type": "alphanumeric", "value": "M"}"#)
                .unwrap();
        assert_eq!(
            req.action().unwrap(),
            ModuleAction::Value(ModuleType::Alphanumeric, i64::from(b'M'))
        );

        let req: ModuleRequest = serde_json::from_str(r#"{"addr": 7, "info": true}"#).unwrap();
        assert_eq!(req.action().unwrap(), ModuleAction::Info);

        let req: ModuleRequest =
            serde_json::from_str(r#"{"addr": 7, "type": "minute", "value": "12"}"#).unwrap();
        assert!(req.action().is_err());

        let req: ModuleRequest = serde_json::from_str(r#"{"addr": 7}"#).unwrap();
        assert!(req.action().is_err());
    }

    #[test]
    fn test_error_status_mapping() {
        let err: AppError = SbbError::connection("no port").into();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);

        let err: AppError = SbbError::ResponseTimeout {
            expected: 1,
            received: 0,
            timeout: std::time::Duration::from_secs(2),
        }
        .into();
        assert_eq!(err.status, StatusCode::GATEWAY_TIMEOUT);

        let err: AppError = SbbError::validation("bad").into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err: AppError = SbbError::internal("gone").into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
