//! 사용자 데이터 스트림 웹소켓.
//!
//! 토큰이 포함된 엔드포인트에 연결해 주문 갱신/토큰 만료 메시지를
//! [`StreamEvent`]로 변환하고 채널로 전달합니다. 재연결은 이 모듈이 아니라
//! 스트림 수명주기 관리자가 갱신 주기에서 수행합니다.
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! use oms_exchange::stream::UserDataStream;
//!
//! let mut stream = UserDataStream::new("wss://fstream.binance.com", &listen_key);
//! let mut rx = stream.take_receiver().expect("receiver");
//! let stop = stream.stop_handle();
//!
//! tokio::spawn(async move { stream.connect().await });
//!
//! while let Some(event) = rx.recv().await {
//!     // 리컨실레이션 푸시 경로로 전달
//! }
//!
//! // 갱신 주기에서 기존 세션 종료
//! let _ = stop.send(()).await;
//! ```

use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use oms_core::{ExchangeError, OrderStatus, OrderUpdateEvent, Side, StreamEvent};

use crate::client::{millis_to_datetime, wire_to_order_type};

const EVENT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// 메시지 파싱
// =============================================================================

/// 원시 스트림 메시지를 엔진 이벤트로 변환합니다.
///
/// 주문 갱신(`ORDER_TRADE_UPDATE`)과 토큰 만료(`listenKeyExpired`)만
/// 이벤트가 되며, 나머지 메시지(잔고 갱신 등)는 `None`으로 무시됩니다.
pub fn parse_stream_event(raw: &str) -> Option<StreamEvent> {
    let value: Value = serde_json::from_str(raw).ok()?;
    match value.get("e").and_then(Value::as_str) {
        Some("ORDER_TRADE_UPDATE") => parse_order_update(&value).map(StreamEvent::OrderUpdate),
        Some("listenKeyExpired") => Some(StreamEvent::ListenKeyExpired),
        _ => None,
    }
}

fn parse_order_update(value: &Value) -> Option<OrderUpdateEvent> {
    let data = value.get("o")?;
    let status = OrderStatus::parse(data.get("X")?.as_str()?)?;
    Some(OrderUpdateEvent {
        symbol: str_field(data, "s")?,
        client_order_id: str_field(data, "c")?,
        ref_id: data
            .get("i")
            .and_then(Value::as_i64)
            .map(|id| id.to_string())
            .unwrap_or_default(),
        status,
        order_type: data
            .get("o")
            .and_then(Value::as_str)
            .and_then(wire_to_order_type),
        side: data.get("S").and_then(Value::as_str).and_then(Side::parse),
        executed_qty: decimal_field(data, "z"),
        avg_price: decimal_field(data, "ap"),
        commission: decimal_field(data, "n"),
        commission_asset: data
            .get("N")
            .and_then(Value::as_str)
            .map(str::to_string),
        event_time: value
            .get("E")
            .and_then(Value::as_i64)
            .map(millis_to_datetime)
            .unwrap_or_else(chrono::Utc::now),
    })
}

fn str_field(data: &Value, key: &str) -> Option<String> {
    data.get(key).and_then(Value::as_str).map(str::to_string)
}

/// 문자열 숫자 필드를 Decimal로 읽습니다. 없거나 파싱 불가하면 0.
fn decimal_field(data: &Value, key: &str) -> Decimal {
    data.get(key)
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<Decimal>().ok())
        .unwrap_or(Decimal::ZERO)
}

// =============================================================================
// UserDataStream
// =============================================================================

/// 사용자 데이터 스트림 세션.
///
/// 세션은 토큰(listen key) 하나에 1:1로 대응합니다. 토큰을 갱신하면
/// 기존 세션을 `stop_handle()`로 종료하고 새 세션을 생성해야 합니다.
pub struct UserDataStream {
    endpoint: String,
    tx: mpsc::Sender<StreamEvent>,
    rx: Option<mpsc::Receiver<StreamEvent>>,
    stop_tx: mpsc::Sender<()>,
    stop_rx: Option<mpsc::Receiver<()>>,
}

impl UserDataStream {
    pub fn new(stream_url: &str, listen_key: &str) -> Self {
        let endpoint = format!("{}/ws/{}", stream_url.trim_end_matches('/'), listen_key);
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (stop_tx, stop_rx) = mpsc::channel(1);
        Self {
            endpoint,
            tx,
            rx: Some(rx),
            stop_tx,
            stop_rx: Some(stop_rx),
        }
    }

    /// 이벤트 수신 채널. 최초 한 번만 가져갈 수 있습니다.
    pub fn take_receiver(&mut self) -> Option<mpsc::Receiver<StreamEvent>> {
        self.rx.take()
    }

    /// 세션 종료 핸들. `send(())` 시 Close 프레임을 보내고 세션을 끝냅니다.
    pub fn stop_handle(&self) -> mpsc::Sender<()> {
        self.stop_tx.clone()
    }

    /// 연결 후 메시지 루프를 실행합니다. 에러로 끝나면 수신 측에
    /// [`StreamEvent::Disconnected`]를 전달하고 반환합니다.
    pub async fn connect(&mut self) {
        let mut stop_rx = match self.stop_rx.take() {
            Some(rx) => rx,
            None => {
                warn!("스트림 세션이 이미 시작되었습니다");
                return;
            }
        };

        match self.run_session(&mut stop_rx).await {
            Ok(()) => info!("사용자 데이터 스트림 세션 종료"),
            Err(e) => {
                error!(error = %e, "사용자 데이터 스트림 에러");
                let _ = self
                    .tx
                    .send(StreamEvent::Disconnected(e.to_string()))
                    .await;
            }
        }
    }

    async fn run_session(&self, stop_rx: &mut mpsc::Receiver<()>) -> Result<(), ExchangeError> {
        let (ws_stream, _) = connect_async(&self.endpoint)
            .await
            .map_err(|e| ExchangeError::Stream(e.to_string()))?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        info!("사용자 데이터 스트림 연결됨");

        loop {
            tokio::select! {
                Some(msg) = ws_rx.next() => {
                    match msg {
                        Ok(Message::Text(text)) => {
                            if let Some(event) = parse_stream_event(&text) {
                                if self.tx.send(event).await.is_err() {
                                    debug!("수신 채널이 닫혀 스트림 세션을 종료합니다");
                                    break;
                                }
                            }
                        }
                        Ok(Message::Ping(payload)) => {
                            let _ = ws_tx.send(Message::Pong(payload)).await;
                        }
                        Ok(Message::Close(_)) => {
                            let _ = self
                                .tx
                                .send(StreamEvent::Disconnected("서버가 연결을 종료함".to_string()))
                                .await;
                            break;
                        }
                        Err(e) => return Err(ExchangeError::Stream(e.to_string())),
                        _ => {}
                    }
                }
                _ = stop_rx.recv() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
        Ok(())
    }
}
