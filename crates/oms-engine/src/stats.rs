//! 워크플로우 통계 구조체.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 디스패치 사이클 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchStats {
    /// 메일박스에서 수령한 의도 수
    pub claimed: usize,
    /// 거래소에 제출 성공한 주문 수
    pub submitted: usize,
    /// 취소 완료 수
    pub canceled: usize,
    /// 시장가로 격상된 수
    pub escalated: usize,
    /// 로컬 포기 처리된 수 (치명적 거부)
    pub abandoned: usize,
    /// 다음 틱으로 미뤄진 수 (일시 오류, 트리거 대기)
    pub deferred: usize,
    /// 에러 횟수
    pub errors: usize,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            claimed = self.claimed,
            submitted = self.submitted,
            canceled = self.canceled,
            escalated = self.escalated,
            abandoned = self.abandoned,
            deferred = self.deferred,
            errors = self.errors,
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "디스패치 완료"
        );
    }
}

/// 정합성 동기화 사이클 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileStats {
    /// 조회 대상 주문 수
    pub scanned: usize,
    /// 상태가 갱신된 주문 수
    pub synced: usize,
    /// 체결 확정된 주문 수
    pub filled: usize,
    /// 체결 내역과 연결된 주문 수
    pub linked: usize,
    /// 청산 확정된 포지션 수 (손익 기록)
    pub closed: usize,
    /// 거래소에 기록이 없는 주문 수 (소프트 미스)
    pub missing: usize,
    /// 에러 횟수
    pub errors: usize,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl ReconcileStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            scanned = self.scanned,
            synced = self.synced,
            filled = self.filled,
            linked = self.linked,
            closed = self.closed,
            missing = self.missing,
            errors = self.errors,
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "정합성 동기화 완료"
        );
    }
}

/// 고아 정리 사이클 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepStats {
    /// 검사한 주문 수
    pub scanned: usize,
    /// 고아로 판정되어 로컬 종결된 수
    pub orphaned: usize,
    /// 포지션이 유효해 건너뛴 수
    pub skipped: usize,
    /// 보존 기간 만료로 삭제된 취소 주문 수
    pub deleted: u64,
    /// 에러 횟수
    pub errors: usize,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl SweepStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            scanned = self.scanned,
            orphaned = self.orphaned,
            skipped = self.skipped,
            deleted = self.deleted,
            errors = self.errors,
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "고아 정리 완료"
        );
    }
}
