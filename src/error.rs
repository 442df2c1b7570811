//! Unified application error model and mapping helpers.
//! This module provides a common error enum used across the HTTP surface and
//! the gateway/identity modules, along with the HTTP status mapping.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// No credential presented at all.
    Unauthenticated { code: String, message: String },
    /// Credential present but invalid or mismatched (bad widget token,
    /// disallowed origin, invalid/expired session).
    Forbidden { code: String, message: String },
    /// Transient per-window throttle; retry later.
    RateLimited { code: String, message: String },
    /// Billing-level rejection; not retryable until the next period.
    QuotaExceeded { code: String, message: String },
    /// Resource absent (e.g. an empty scraped page).
    NotFound { code: String, message: String },
    /// Malformed client input.
    UserInput { code: String, message: String },
    /// Durable store or generation service failed.
    Upstream { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Unauthenticated { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::RateLimited { code, .. }
            | AppError::QuotaExceeded { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::UserInput { code, .. }
            | AppError::Upstream { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Unauthenticated { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::RateLimited { message, .. }
            | AppError::QuotaExceeded { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::UserInput { message, .. }
            | AppError::Upstream { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn unauthenticated<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Unauthenticated { code: code.into(), message: msg.into() } }
    pub fn forbidden<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn rate_limited<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::RateLimited { code: code.into(), message: msg.into() } }
    pub fn quota_exceeded<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::QuotaExceeded { code: code.into(), message: msg.into() } }
    pub fn not_found<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn user<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn upstream<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Upstream { code: code.into(), message: msg.into() } }
    pub fn internal<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Unauthenticated { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::RateLimited { .. } => 429,
            AppError::QuotaExceeded { .. } => 402,
            AppError::NotFound { .. } => 404,
            AppError::UserInput { .. } => 400,
            AppError::Upstream { .. } => 502,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Default mapping: treat as Internal unless downcasted elsewhere
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}
