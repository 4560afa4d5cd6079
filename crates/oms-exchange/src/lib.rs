//! 선물 거래소 클라이언트.
//!
//! 이 crate는 다음을 제공합니다:
//! - 서명 REST 클라이언트 (주문/체결/계좌/포지션, 스트림 토큰 수명주기)
//! - 사용자 데이터 스트림 웹소켓과 이벤트 파싱
//! - 일시적 에러 재시도 유틸리티
//! - DRY_RUN/테스트용 스크립트형 mock 거래소
//!
//! # 예제
//!
//! ```rust,ignore
//! use oms_exchange::{FuturesClientConfig, FuturesRestClient};
//! use secrecy::SecretString;
//!
//! let config = FuturesClientConfig::new(api_key, SecretString::from(api_secret));
//! let client = FuturesRestClient::new(config);
//! let account = client.get_account_info().await?;
//! ```

pub mod client;
pub mod mock;
pub mod retry;
pub mod stream;

// 주요 타입 재내보내기
pub use client::{FuturesClientConfig, FuturesRestClient};
pub use mock::{MockExchange, MockExchangeConfig};
pub use retry::{with_retry, RetryConfig};
pub use stream::{parse_stream_event, UserDataStream};
