//! 환경변수 기반 설정 모듈.

use std::fmt;
use std::time::Duration;

use secrecy::SecretString;

use crate::Result;

/// Engine 전체 설정
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 대상 거래소 식별자 (예: "binance")
    pub exchange: String,
    /// 이 엔진 인스턴스의 봇 식별자
    pub bot_id: String,
    /// 관리 대상 심볼 목록
    pub symbols: Vec<String>,
    /// 데이터베이스 URL
    pub database_url: String,
    /// Redis URL
    pub redis_url: String,
    /// 거래소 API 자격증명
    pub credentials: CredentialConfig,
    /// 주기 작업 설정
    pub intervals: IntervalConfig,
    /// 재시도 격상 설정
    pub escalation: EscalationConfig,
    /// 정합성 동기화 설정
    pub reconcile: ReconcileConfig,
    /// 고아 주문 정리 설정
    pub sweep: SweepConfig,
    /// 드라이런 모드 (인메모리 저장소 + 모의 거래소)
    pub dry_run: bool,
}

/// 거래소 API 자격증명
///
/// 시크릿은 로그와 Debug 출력에 노출되지 않습니다.
#[derive(Clone)]
pub struct CredentialConfig {
    pub api_key: String,
    pub api_secret: SecretString,
    /// REST 베이스 URL 재정의 (테스트넷 등)
    pub base_url: Option<String>,
    /// WebSocket 스트림 URL 재정의
    pub stream_url: Option<String>,
}

impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("api_key", &"***")
            .field("api_secret", &"***")
            .field("base_url", &self.base_url)
            .field("stream_url", &self.stream_url)
            .finish()
    }
}

/// 주기 작업 설정
#[derive(Debug, Clone)]
pub struct IntervalConfig {
    /// 디스패치 틱 주기 (초)
    pub dispatch_secs: u64,
    /// 정합성 폴링 주기 (초)
    pub reconcile_secs: u64,
    /// 고아 정리 주기 (분)
    pub sweep_minutes: u64,
    /// 스트림 토큰 갱신 주기 (분). 토큰 수명보다 짧아야 합니다.
    pub stream_refresh_minutes: u64,
    /// 스트림 keepalive 주기 (분)
    pub stream_keepalive_minutes: u64,
}

/// 재시도 격상 설정
#[derive(Debug, Clone)]
pub struct EscalationConfig {
    /// 지정가 재시도 허용 횟수. 카운터가 이 값을 초과하면 시장가로 격상.
    pub threshold: u32,
}

/// 정합성 동기화 설정
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// 체결 내역 조회 시 심볼당 가져올 건수
    pub trade_fetch_limit: u32,
}

/// 고아 주문 정리 설정
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// 이 시간(분)보다 오래된 보호 주문을 고아 후보로 간주
    pub orphan_age_minutes: u64,
    /// 취소 주문 보존 기간 (일)
    pub retention_days: u64,
}

impl EngineConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        // 드라이런에서는 외부 자격증명 없이 기동 가능
        let dry_run = env_var_bool("DRY_RUN", false);

        Ok(Self {
            exchange: env_var_or("EXCHANGE_NAME", "binance"),
            bot_id: env_var_or("BOT_ID", "oms-bot"),
            symbols: env_var_list_or_default("SYMBOLS", vec!["BTCUSDT".to_string()]),
            database_url: required_env("DATABASE_URL", dry_run)?,
            redis_url: env_var_or("REDIS_URL", "redis://127.0.0.1:6379"),
            credentials: CredentialConfig {
                api_key: required_env("EXCHANGE_API_KEY", dry_run)?,
                api_secret: SecretString::from(required_env("EXCHANGE_API_SECRET", dry_run)?),
                base_url: std::env::var("EXCHANGE_BASE_URL").ok(),
                stream_url: std::env::var("EXCHANGE_STREAM_URL").ok(),
            },
            intervals: IntervalConfig {
                dispatch_secs: env_var_parse("DISPATCH_INTERVAL_SECS", 3),
                reconcile_secs: env_var_parse("RECONCILE_INTERVAL_SECS", 10),
                sweep_minutes: env_var_parse("SWEEP_INTERVAL_MINUTES", 5),
                stream_refresh_minutes: env_var_parse("STREAM_REFRESH_MINUTES", 30),
                stream_keepalive_minutes: env_var_parse("STREAM_KEEPALIVE_MINUTES", 20),
            },
            escalation: EscalationConfig {
                threshold: env_var_parse("ESCALATION_THRESHOLD", 5),
            },
            reconcile: ReconcileConfig {
                trade_fetch_limit: env_var_parse("TRADE_FETCH_LIMIT", 20),
            },
            sweep: SweepConfig {
                orphan_age_minutes: env_var_parse("ORPHAN_AGE_MINUTES", 360),
                retention_days: env_var_parse("CANCELED_RETENTION_DAYS", 3),
            },
            dry_run,
        })
    }
}

impl IntervalConfig {
    /// 디스패치 틱 주기를 Duration으로 반환
    pub fn dispatch(&self) -> Duration {
        Duration::from_secs(self.dispatch_secs)
    }

    /// 정합성 폴링 주기를 Duration으로 반환
    pub fn reconcile(&self) -> Duration {
        Duration::from_secs(self.reconcile_secs)
    }

    /// 고아 정리 주기를 Duration으로 반환
    pub fn sweep(&self) -> Duration {
        Duration::from_secs(self.sweep_minutes * 60)
    }

    /// 스트림 토큰 갱신 주기를 Duration으로 반환
    pub fn stream_refresh(&self) -> Duration {
        Duration::from_secs(self.stream_refresh_minutes * 60)
    }

    /// 스트림 keepalive 주기를 Duration으로 반환
    pub fn stream_keepalive(&self) -> Duration {
        Duration::from_secs(self.stream_keepalive_minutes * 60)
    }
}

/// 필수 환경변수 로드. 드라이런에서는 빈 값으로 대체합니다.
fn required_env(key: &str, allow_missing: bool) -> Result<String> {
    match std::env::var(key) {
        Ok(v) => Ok(v),
        Err(_) if allow_missing => Ok(String::new()),
        Err(_) => Err(crate::error::EngineError::Config(format!(
            "{} 환경변수가 설정되지 않았습니다",
            key
        ))),
    }
}

/// 환경변수에서 문자열 로드 (없으면 기본값)
fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 환경변수에서 bool 값 파싱
fn env_var_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

/// 환경변수에서 쉼표로 구분된 리스트 파싱 (기본값 지원)
fn env_var_list_or_default(key: &str, default: Vec<String>) -> Vec<String> {
    std::env::var(key)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_durations() {
        let intervals = IntervalConfig {
            dispatch_secs: 3,
            reconcile_secs: 10,
            sweep_minutes: 5,
            stream_refresh_minutes: 30,
            stream_keepalive_minutes: 20,
        };
        assert_eq!(intervals.dispatch(), Duration::from_secs(3));
        assert_eq!(intervals.reconcile(), Duration::from_secs(10));
        assert_eq!(intervals.sweep(), Duration::from_secs(300));
        assert_eq!(intervals.stream_refresh(), Duration::from_secs(1800));
        // keepalive는 토큰 갱신보다 짧아야 갱신 전 만료를 막을 수 있음
        assert!(intervals.stream_keepalive() < intervals.stream_refresh());
    }

    #[test]
    fn test_credential_debug_masks_secrets() {
        let creds = CredentialConfig {
            api_key: "real-key".to_string(),
            api_secret: SecretString::from("real-secret".to_string()),
            base_url: None,
            stream_url: None,
        };
        let output = format!("{:?}", creds);
        assert!(!output.contains("real-key"));
        assert!(!output.contains("real-secret"));
        assert!(output.contains("***"));
    }
}
