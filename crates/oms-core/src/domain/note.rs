//! 주문 진단 기록.
//!
//! `Order.note`에 직렬화되는 단일 구조화 레코드입니다. 관측용으로만 쓰이며
//! 엔진은 이 페이로드를 다시 파싱하거나 제어 흐름에 사용하지 않습니다.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 진단 레코드를 남긴 처리 단계.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStage {
    /// 디스패치 단계에서 포기된 주문
    Dispatch,
    /// 고아 정리로 종결된 주문
    Sweep,
}

/// `Order.note`에 기록되는 구조화 진단 레코드.
#[derive(Debug, Clone, Serialize)]
pub struct NoteRecord {
    pub time: DateTime<Utc>,
    pub bot_id: String,
    pub stage: NoteStage,
    /// 거래소 거부 코드 등 수치 코드 (있는 경우)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    pub message: String,
}

impl NoteRecord {
    pub fn new(bot_id: impl Into<String>, stage: NoteStage, message: impl Into<String>) -> Self {
        Self {
            time: Utc::now(),
            bot_id: bot_id.into(),
            stage,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    /// JSON 문자열로 직렬화합니다. 직렬화 실패 시 메시지 원문으로 대체합니다.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.message.clone())
    }
}
