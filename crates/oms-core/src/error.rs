//! 엔진 공용 에러 타입.
//!
//! 거래소 에러는 재시도 정책이 의존하는 분류 메서드
//! (`is_retryable`/`is_fatal`/`is_would_trigger`/`retry_delay_ms`)를 함께
//! 제공합니다.

use thiserror::Error;

/// "현재 가격에서 즉시 체결됨" 거부 코드.
///
/// 비체결가 지정가 주문이 제출 전에 가격이 움직여 거부되는, 엔진이 유일하게
/// 카운터 기반 재시도로 흡수하는 거부 클래스입니다.
pub const REJECT_WOULD_TRIGGER: i64 = -2021;

/// 미확인 주문(이미 체결/취소되어 거래소에 없는 주문) 거부 코드.
pub const REJECT_UNKNOWN_ORDER: i64 = -2011;

/// 잔고 부족 거부 코드.
pub const REJECT_INSUFFICIENT_MARGIN: i64 = -2019;

// =============================================================================
// ExchangeError
// =============================================================================

/// 거래소 클라이언트 에러.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// 네트워크 에러
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 요청 시간 초과
    #[error("요청 시간 초과: {0}")]
    Timeout(String),

    /// 인증 실패
    #[error("인증 실패: {0}")]
    Authentication(String),

    /// 레이트 리밋 초과
    #[error("레이트 리밋 초과: {0}")]
    RateLimited(String),

    /// 거래소 주문 거부 (코드 포함)
    #[error("주문 거부 (코드 {code}): {message}")]
    Rejected { code: i64, message: String },

    /// 응답 파싱 에러
    #[error("파싱 에러: {0}")]
    Parse(String),

    /// 스트림 에러
    #[error("스트림 에러: {0}")]
    Stream(String),

    /// 기타 에러
    #[error("기타 에러: {0}")]
    Other(String),
}

impl ExchangeError {
    pub fn rejected(code: i64, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }

    /// "즉시 체결됨" 거부 클래스 여부. 에스컬레이션 카운터의 유일한 입력.
    pub fn is_would_trigger(&self) -> bool {
        matches!(self, Self::Rejected { code, .. } if *code == REJECT_WOULD_TRIGGER)
    }

    /// 일시적 에러 여부. 다음 틱 또는 전송 계층 재시도로 해소됩니다.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited(_) | Self::Stream(_)
        )
    }

    /// 재시도해도 소용없는 에러 여부 (인증 등).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    /// 거부 코드 (거부가 아니면 None).
    pub fn reject_code(&self) -> Option<i64> {
        match self {
            Self::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// 에러 종류별 권장 재시도 대기 시간 (밀리초).
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited(_) => Some(2_000),
            Self::Timeout(_) => Some(1_000),
            Self::Network(_) | Self::Stream(_) => Some(500),
            _ => None,
        }
    }
}

// =============================================================================
// StoreError
// =============================================================================

/// 주문 저장소/공유 캐시 에러.
#[derive(Debug, Error)]
pub enum StoreError {
    /// 데이터베이스 에러
    #[error("데이터베이스 에러: {0}")]
    Database(String),

    /// 캐시 에러
    #[error("캐시 에러: {0}")]
    Cache(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),

    /// 연결 에러
    #[error("연결 에러: {0}")]
    Connection(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
