//! 에러 타입 정의.

use std::fmt;

use oms_core::{ExchangeError, StoreError};

/// Engine 에러 타입
#[derive(Debug)]
pub enum EngineError {
    /// 저장소 에러 (Postgres, Redis)
    Store(StoreError),
    /// 거래소 API 에러
    Exchange(ExchangeError),
    /// 설정 에러
    Config(String),
    /// 유저 데이터 스트림 에러
    Stream(String),
    /// 일반 에러
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "Store error: {}", e),
            Self::Exchange(e) => write!(f, "Exchange error: {}", e),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::Stream(msg) => write!(f, "Stream error: {}", msg),
            Self::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<ExchangeError> for EngineError {
    fn from(err: ExchangeError) -> Self {
        Self::Exchange(err)
    }
}

impl From<std::env::VarError> for EngineError {
    fn from(err: std::env::VarError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for EngineError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::Other(err)
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, EngineError>;
