//! Binance USDⓈ-M 선물 REST 클라이언트.
//!
//! 주문 제출/취소/조회, 체결 내역, 계좌/포지션 조회, 사용자 데이터 스트림
//! 토큰 수명주기를 [`ExchangeClient`] trait으로 제공합니다.
//!
//! # 인증
//!
//! 서명 엔드포인트는 쿼리 문자열에 `recvWindow`/`timestamp`를 덧붙인 뒤
//! HMAC-SHA256 서명을 `signature` 파라미터로 추가합니다. API 키는
//! `X-MBX-APIKEY` 헤더로 전달합니다. 스트림 토큰 엔드포인트는 서명 없이
//! API 키 헤더만 사용합니다.
//!
//! # 주문 종류 매핑
//!
//! | 도메인 종류        | 선물 API 종류       |
//! |--------------------|---------------------|
//! | `Limit`            | `LIMIT`             |
//! | `StopLossLimit`    | `STOP`              |
//! | `TakeProfitLimit`  | `TAKE_PROFIT`       |
//! | `Market`           | `MARKET`            |
//! | `Stop`             | `STOP_MARKET`       |
//! | `TakeProfit`       | `TAKE_PROFIT_MARKET`|

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use oms_core::{
    AccountInfo, ExchangeClient, ExchangeError, ExchangeOrder, Order, OrderAck, OrderStatus,
    OrderType, PositionSide, PositionSnapshot, Side, TradeFill,
};

use crate::retry::{with_retry, RetryConfig};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_BASE_URL: &str = "https://fapi.binance.com";
const DEFAULT_STREAM_URL: &str = "wss://fstream.binance.com";
const DEFAULT_RECV_WINDOW_MS: u64 = 5_000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const ORDER_PATH: &str = "/fapi/v1/order";
const USER_TRADES_PATH: &str = "/fapi/v1/userTrades";
const ACCOUNT_PATH: &str = "/fapi/v2/account";
const POSITION_RISK_PATH: &str = "/fapi/v2/positionRisk";
const LISTEN_KEY_PATH: &str = "/fapi/v1/listenKey";

/// 주문 조회 시 "기록 없음"으로 취급하는 거부 코드 (NO_SUCH_ORDER).
const REJECT_NO_SUCH_ORDER: i64 = -2013;

// =============================================================================
// 설정
// =============================================================================

/// 선물 REST 클라이언트 설정.
#[derive(Clone)]
pub struct FuturesClientConfig {
    pub api_key: String,
    pub api_secret: SecretString,
    pub base_url: String,
    /// 웹소켓 스트림 기본 URL (`wss://...`)
    pub stream_url: String,
    pub recv_window_ms: u64,
    pub exchange_name: String,
}

impl FuturesClientConfig {
    pub fn new(api_key: impl Into<String>, api_secret: SecretString) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret,
            base_url: DEFAULT_BASE_URL.to_string(),
            stream_url: DEFAULT_STREAM_URL.to_string(),
            recv_window_ms: DEFAULT_RECV_WINDOW_MS,
            exchange_name: "binance".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_stream_url(mut self, stream_url: impl Into<String>) -> Self {
        self.stream_url = stream_url.into();
        self
    }

    pub fn with_exchange_name(mut self, name: impl Into<String>) -> Self {
        self.exchange_name = name.into();
        self
    }
}

impl fmt::Debug for FuturesClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuturesClientConfig")
            .field("api_key", &"***")
            .field("api_secret", &"***")
            .field("base_url", &self.base_url)
            .field("stream_url", &self.stream_url)
            .field("recv_window_ms", &self.recv_window_ms)
            .field("exchange_name", &self.exchange_name)
            .finish()
    }
}

// =============================================================================
// 서명/변환 헬퍼
// =============================================================================

/// 쿼리 문자열의 HMAC-SHA256 서명 (16진수 소문자).
fn sign_query(secret: &str, query: &str) -> Result<String, ExchangeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Authentication(format!("서명 키 초기화 실패: {e}")))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// 도메인 주문 종류를 선물 API 주문 종류로 변환합니다.
pub(crate) fn order_type_to_wire(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Limit => "LIMIT",
        OrderType::Market => "MARKET",
        OrderType::StopLossLimit => "STOP",
        OrderType::TakeProfitLimit => "TAKE_PROFIT",
        OrderType::Stop => "STOP_MARKET",
        OrderType::TakeProfit => "TAKE_PROFIT_MARKET",
    }
}

/// 선물 API 주문 종류를 도메인 주문 종류로 변환합니다.
pub(crate) fn wire_to_order_type(raw: &str) -> Option<OrderType> {
    match raw {
        "LIMIT" => Some(OrderType::Limit),
        "MARKET" => Some(OrderType::Market),
        "STOP" => Some(OrderType::StopLossLimit),
        "TAKE_PROFIT" => Some(OrderType::TakeProfitLimit),
        "STOP_MARKET" => Some(OrderType::Stop),
        "TAKE_PROFIT_MARKET" => Some(OrderType::TakeProfit),
        _ => None,
    }
}

/// epoch 밀리초를 UTC 시각으로 변환합니다. 0 이하이면 현재 시각.
pub(crate) fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    if ms <= 0 {
        return Utc::now();
    }
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

/// 문자열 숫자 필드를 Decimal로 변환합니다. 빈 문자열은 0으로 취급합니다.
fn parse_decimal_field(raw: &str, field: &str) -> Result<Decimal, ExchangeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }
    trimmed
        .parse::<Decimal>()
        .map_err(|e| ExchangeError::Parse(format!("{field} 파싱 실패 ({trimmed}): {e}")))
}

fn parse_status_field(raw: &str) -> Result<OrderStatus, ExchangeError> {
    OrderStatus::parse(raw)
        .ok_or_else(|| ExchangeError::Parse(format!("알 수 없는 주문 상태: {raw}")))
}

fn transport_err(e: reqwest::Error) -> ExchangeError {
    if e.is_timeout() {
        ExchangeError::Timeout(e.to_string())
    } else {
        ExchangeError::Network(e.to_string())
    }
}

// =============================================================================
// API 응답 타입
// =============================================================================

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiOrderResponse {
    order_id: i64,
    #[serde(default)]
    client_order_id: String,
    symbol: String,
    status: String,
    #[serde(default)]
    price: String,
    #[serde(default)]
    avg_price: String,
    #[serde(default)]
    stop_price: String,
    #[serde(default)]
    executed_qty: String,
    #[serde(default, rename = "type")]
    order_type: String,
    #[serde(default)]
    side: String,
    #[serde(default)]
    update_time: i64,
}

impl ApiOrderResponse {
    /// 제출/취소 응답을 승인 응답으로 변환합니다. 평균 체결가가 있으면
    /// 주문 가격보다 우선합니다.
    fn into_ack(self) -> Result<OrderAck, ExchangeError> {
        let avg_price = parse_decimal_field(&self.avg_price, "avgPrice")?;
        let price = parse_decimal_field(&self.price, "price")?;
        Ok(OrderAck {
            ref_id: self.order_id.to_string(),
            status: parse_status_field(&self.status)?,
            price: if avg_price.is_zero() { price } else { avg_price },
            executed_qty: parse_decimal_field(&self.executed_qty, "executedQty")?,
            transact_time: millis_to_datetime(self.update_time),
        })
    }

    fn into_exchange_order(self) -> Result<ExchangeOrder, ExchangeError> {
        Ok(ExchangeOrder {
            ref_id: self.order_id.to_string(),
            client_order_id: self.client_order_id,
            symbol: self.symbol,
            status: parse_status_field(&self.status)?,
            order_type: wire_to_order_type(&self.order_type),
            side: Side::parse(&self.side),
            price: parse_decimal_field(&self.price, "price")?,
            avg_price: parse_decimal_field(&self.avg_price, "avgPrice")?,
            stop_price: parse_decimal_field(&self.stop_price, "stopPrice")?,
            executed_qty: parse_decimal_field(&self.executed_qty, "executedQty")?,
            update_time: millis_to_datetime(self.update_time),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiTradeResponse {
    id: i64,
    order_id: i64,
    symbol: String,
    price: String,
    qty: String,
    commission: String,
    #[serde(default)]
    commission_asset: String,
    time: i64,
}

impl ApiTradeResponse {
    fn into_fill(self) -> Result<TradeFill, ExchangeError> {
        Ok(TradeFill {
            trade_id: self.id,
            order_ref_id: self.order_id.to_string(),
            symbol: self.symbol,
            price: parse_decimal_field(&self.price, "price")?,
            qty: parse_decimal_field(&self.qty, "qty")?,
            commission: parse_decimal_field(&self.commission, "commission")?,
            commission_asset: self.commission_asset,
            time: millis_to_datetime(self.time),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiAccountResponse {
    total_wallet_balance: String,
    available_balance: String,
    total_unrealized_profit: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPositionResponse {
    symbol: String,
    position_amt: String,
    entry_price: String,
    mark_price: String,
    #[serde(default)]
    position_side: String,
    #[serde(default)]
    update_time: i64,
}

impl ApiPositionResponse {
    fn into_snapshot(self) -> Result<PositionSnapshot, ExchangeError> {
        let amount = parse_decimal_field(&self.position_amt, "positionAmt")?;
        // 단방향 모드의 BOTH는 수량 부호로 방향을 판정
        let inferred = if amount.is_sign_negative() {
            PositionSide::Short
        } else {
            PositionSide::Long
        };
        let position_side = PositionSide::parse(&self.position_side).unwrap_or(inferred);
        Ok(PositionSnapshot {
            symbol: self.symbol,
            position_side,
            amount: amount.abs(),
            entry_price: parse_decimal_field(&self.entry_price, "entryPrice")?,
            mark_price: parse_decimal_field(&self.mark_price, "markPrice")?,
            updated: millis_to_datetime(self.update_time),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ListenKeyResponse {
    #[serde(rename = "listenKey")]
    listen_key: String,
}

// =============================================================================
// FuturesRestClient
// =============================================================================

/// Binance USDⓈ-M 선물 REST 클라이언트.
///
/// 조회 경로(주문/체결/계좌/포지션, listenKey 연장)는 일시 오류에 대해
/// 재시도합니다. 주문 제출/취소는 중복 전송 위험 때문에 단일 시도이며,
/// 실패 처리(연기, 격상, 포기)는 호출 측이 결정합니다.
pub struct FuturesRestClient {
    client: Client,
    config: FuturesClientConfig,
    retry: RetryConfig,
}

impl FuturesRestClient {
    pub fn new(config: FuturesClientConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            // 디스패치/정합성 틱 주기 안에 끝나야 하므로 짧은 재시도
            retry: RetryConfig::fast(),
        }
    }

    /// 조회 경로 재시도 설정 교체.
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// 웹소켓 스트림 기본 URL.
    pub fn stream_url(&self) -> &str {
        &self.config.stream_url
    }

    /// 서명 요청 전송. 쿼리에 `recvWindow`/`timestamp`/`signature`를 덧붙입니다.
    async fn signed_request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let mut query = serde_urlencoded::to_string(params)
            .map_err(|e| ExchangeError::Parse(format!("쿼리 직렬화 실패: {e}")))?;
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!(
            "recvWindow={}&timestamp={}",
            self.config.recv_window_ms,
            Utc::now().timestamp_millis()
        ));
        let signature = sign_query(self.config.api_secret.expose_secret(), &query)?;
        query.push_str("&signature=");
        query.push_str(&signature);

        let url = format!("{}{}?{}", self.config.base_url, path, query);
        debug!(%method, path, "서명 요청 전송");
        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.config.api_key)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport_err)?;
        Self::parse_response(response).await
    }

    /// API 키 헤더만 사용하는 요청 (스트림 토큰 엔드포인트).
    async fn keyed_request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
    ) -> Result<T, ExchangeError> {
        let url = format!("{}{}", self.config.base_url, path);
        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.config.api_key)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport_err)?;
        Self::parse_response(response).await
    }

    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ExchangeError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExchangeError::Network(format!("응답 본문 읽기 실패: {e}")))?;
        if status.is_success() {
            return serde_json::from_str(&body)
                .map_err(|e| ExchangeError::Parse(format!("응답 파싱 실패: {e}: {body}")));
        }
        Err(classify_api_error(status, &body))
    }

    fn limit_order_params(order: &Order) -> Result<Vec<(&'static str, String)>, ExchangeError> {
        if !order.order_type.is_limit_family() {
            return Err(ExchangeError::Other(format!(
                "지정가 계열이 아닌 주문 종류: {}",
                order.order_type.as_str()
            )));
        }
        let mut params = vec![
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("positionSide", order.position_side.as_str().to_string()),
            ("type", order_type_to_wire(order.order_type).to_string()),
            ("quantity", order.qty.to_string()),
            ("price", order.open_price.to_string()),
            ("timeInForce", "GTC".to_string()),
            ("newClientOrderId", order.id.clone()),
        ];
        if order.order_type.requires_trigger() {
            params.push(("stopPrice", order.stop_price.to_string()));
        }
        Ok(params)
    }

    fn market_order_params(order: &Order) -> Vec<(&'static str, String)> {
        // Stop/TakeProfit은 트리거-시장가 변형으로 제출됨
        let wire_type = match order.order_type {
            OrderType::Stop => "STOP_MARKET",
            OrderType::TakeProfit => "TAKE_PROFIT_MARKET",
            _ => "MARKET",
        };
        let mut params = vec![
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("positionSide", order.position_side.as_str().to_string()),
            ("type", wire_type.to_string()),
            ("quantity", order.qty.to_string()),
            ("newClientOrderId", order.id.clone()),
        ];
        if matches!(order.order_type, OrderType::Stop | OrderType::TakeProfit) {
            params.push(("stopPrice", order.stop_price.to_string()));
        }
        params
    }

    /// 주문 식별 파라미터. 거래소 ID가 있으면 함께 전달합니다.
    fn order_lookup_params(
        symbol: &str,
        client_order_id: &str,
        ref_id: &str,
    ) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("origClientOrderId", client_order_id.to_string()),
        ];
        if !ref_id.is_empty() {
            params.push(("orderId", ref_id.to_string()));
        }
        params
    }
}

/// HTTP 에러 응답 분류.
///
/// 거래소 에러 본문(`{code, msg}`)이 있으면 코드 기반으로, 없으면 HTTP 상태
/// 기반으로 분류합니다.
fn classify_api_error(status: StatusCode, body: &str) -> ExchangeError {
    if let Ok(err) = serde_json::from_str::<ApiErrorBody>(body) {
        return match err.code {
            -2014 | -2015 => ExchangeError::Authentication(err.msg),
            -1003 => ExchangeError::RateLimited(err.msg),
            _ => ExchangeError::rejected(err.code, err.msg),
        };
    }
    match status.as_u16() {
        401 | 403 => ExchangeError::Authentication(body.to_string()),
        418 | 429 => ExchangeError::RateLimited(body.to_string()),
        500..=599 => ExchangeError::Network(format!("HTTP {status}: {body}")),
        _ => ExchangeError::Other(format!("HTTP {status}: {body}")),
    }
}

#[async_trait]
impl ExchangeClient for FuturesRestClient {
    async fn place_limit_order(&self, order: &Order) -> Result<OrderAck, ExchangeError> {
        let params = Self::limit_order_params(order)?;
        let response: ApiOrderResponse = self
            .signed_request(Method::POST, ORDER_PATH, &params)
            .await?;
        response.into_ack()
    }

    async fn place_market_order(&self, order: &Order) -> Result<OrderAck, ExchangeError> {
        let params = Self::market_order_params(order);
        let response: ApiOrderResponse = self
            .signed_request(Method::POST, ORDER_PATH, &params)
            .await?;
        response.into_ack()
    }

    async fn cancel_order(
        &self,
        symbol: &str,
        client_order_id: &str,
        ref_id: &str,
    ) -> Result<OrderAck, ExchangeError> {
        let params = Self::order_lookup_params(symbol, client_order_id, ref_id);
        let response: ApiOrderResponse = self
            .signed_request(Method::DELETE, ORDER_PATH, &params)
            .await?;
        response.into_ack()
    }

    async fn get_order(
        &self,
        symbol: &str,
        client_order_id: &str,
        ref_id: &str,
    ) -> Result<Option<ExchangeOrder>, ExchangeError> {
        let params = Self::order_lookup_params(symbol, client_order_id, ref_id);
        let result = with_retry(&self.retry, || {
            self.signed_request::<ApiOrderResponse>(Method::GET, ORDER_PATH, &params)
        })
        .await;
        match result {
            Ok(response) => Ok(Some(response.into_exchange_order()?)),
            Err(ExchangeError::Rejected { code, .. }) if code == REJECT_NO_SUCH_ORDER => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_trades_list(
        &self,
        symbol: &str,
        limit: u32,
    ) -> Result<Vec<TradeFill>, ExchangeError> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("limit", limit.to_string()),
        ];
        let trades: Vec<ApiTradeResponse> = with_retry(&self.retry, || {
            self.signed_request(Method::GET, USER_TRADES_PATH, &params)
        })
        .await?;
        trades.into_iter().map(ApiTradeResponse::into_fill).collect()
    }

    async fn get_account_info(&self) -> Result<AccountInfo, ExchangeError> {
        let account: ApiAccountResponse = with_retry(&self.retry, || {
            self.signed_request(Method::GET, ACCOUNT_PATH, &[])
        })
        .await?;
        Ok(AccountInfo {
            total_balance: parse_decimal_field(&account.total_wallet_balance, "totalWalletBalance")?,
            available_balance: parse_decimal_field(&account.available_balance, "availableBalance")?,
            unrealized_pnl: parse_decimal_field(
                &account.total_unrealized_profit,
                "totalUnrealizedProfit",
            )?,
            updated: Utc::now(),
        })
    }

    async fn get_open_positions(&self) -> Result<Vec<PositionSnapshot>, ExchangeError> {
        let positions: Vec<ApiPositionResponse> = with_retry(&self.retry, || {
            self.signed_request(Method::GET, POSITION_RISK_PATH, &[])
        })
        .await?;
        let mut snapshots = Vec::new();
        for position in positions {
            let snapshot = position.into_snapshot()?;
            if !snapshot.amount.is_zero() {
                snapshots.push(snapshot);
            }
        }
        Ok(snapshots)
    }

    async fn start_user_data_stream(&self) -> Result<String, ExchangeError> {
        let response: ListenKeyResponse = self.keyed_request(Method::POST, LISTEN_KEY_PATH).await?;
        Ok(response.listen_key)
    }

    async fn keepalive_user_data_stream(&self, _token: &str) -> Result<(), ExchangeError> {
        // 선물 API는 계정당 단일 토큰을 연장하므로 본문이 필요 없음
        let _: serde_json::Value = with_retry(&self.retry, || {
            self.keyed_request(Method::PUT, LISTEN_KEY_PATH)
        })
        .await?;
        Ok(())
    }

    async fn stop_user_data_stream(&self, _token: &str) -> Result<(), ExchangeError> {
        let _: serde_json::Value = self.keyed_request(Method::DELETE, LISTEN_KEY_PATH).await?;
        Ok(())
    }

    fn exchange_name(&self) -> &str {
        &self.config.exchange_name
    }
}

// =============================================================================
// 테스트
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use oms_core::REJECT_WOULD_TRIGGER;
    use rust_decimal_macros::dec;

    fn test_client(base_url: String) -> FuturesRestClient {
        let config = FuturesClientConfig::new(
            "test-key",
            SecretString::from("test-secret".to_string()),
        )
        .with_base_url(base_url);
        FuturesRestClient::new(config)
    }

    fn limit_order() -> Order {
        Order::new(
            "binance",
            "bot-1",
            "BTCUSDT",
            Side::Buy,
            PositionSide::Long,
            OrderType::Limit,
            dec!(1),
        )
        .with_price(dec!(42000))
    }

    #[test]
    fn test_sign_query_known_vector() {
        // 공개 API 문서의 서명 예제
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        let signature = sign_query(secret, query).unwrap();
        assert_eq!(
            signature,
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_wire_type_mapping_roundtrip() {
        for order_type in [
            OrderType::Limit,
            OrderType::Market,
            OrderType::StopLossLimit,
            OrderType::TakeProfitLimit,
            OrderType::Stop,
            OrderType::TakeProfit,
        ] {
            let wire = order_type_to_wire(order_type);
            assert_eq!(wire_to_order_type(wire), Some(order_type));
        }
        assert_eq!(wire_to_order_type("TRAILING_STOP_MARKET"), None);
    }

    #[test]
    fn test_limit_order_params_rejects_market() {
        let mut order = limit_order();
        order.order_type = OrderType::Market;
        assert!(FuturesRestClient::limit_order_params(&order).is_err());
    }

    #[test]
    fn test_stop_limit_params_include_trigger() {
        let order = Order::new(
            "binance",
            "bot-1",
            "BTCUSDT",
            Side::Sell,
            PositionSide::Long,
            OrderType::StopLossLimit,
            dec!(1),
        )
        .with_price(dec!(41000))
        .with_stop_price(dec!(41100));
        let params = FuturesRestClient::limit_order_params(&order).unwrap();
        assert!(params.contains(&("type", "STOP".to_string())));
        assert!(params.contains(&("stopPrice", "41100".to_string())));
    }

    #[test]
    fn test_classify_rejection_codes() {
        let err = classify_api_error(
            StatusCode::BAD_REQUEST,
            r#"{"code":-2021,"msg":"Order would immediately trigger."}"#,
        );
        assert!(err.is_would_trigger());
        assert_eq!(err.reject_code(), Some(REJECT_WOULD_TRIGGER));

        let auth = classify_api_error(
            StatusCode::UNAUTHORIZED,
            r#"{"code":-2015,"msg":"Invalid API-key."}"#,
        );
        assert!(auth.is_fatal());

        let rate = classify_api_error(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(rate.is_retryable());
    }

    #[tokio::test]
    async fn test_place_limit_order_maps_ack() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", ORDER_PATH)
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"orderId":5001,"clientOrderId":"abc","symbol":"BTCUSDT","status":"NEW","price":"42000","avgPrice":"0","stopPrice":"0","executedQty":"0","type":"LIMIT","side":"BUY","updateTime":1700000000000}"#,
            )
            .create_async()
            .await;

        let client = test_client(server.url());
        let ack = client.place_limit_order(&limit_order()).await.unwrap();
        assert_eq!(ack.ref_id, "5001");
        assert_eq!(ack.status, OrderStatus::New);
        assert_eq!(ack.price, dec!(42000));
        assert!(ack.executed_qty.is_zero());
    }

    #[tokio::test]
    async fn test_market_ack_prefers_avg_price() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", ORDER_PATH)
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"orderId":5002,"clientOrderId":"abc","symbol":"BTCUSDT","status":"FILLED","price":"0","avgPrice":"42123.5","stopPrice":"0","executedQty":"1","type":"MARKET","side":"BUY","updateTime":1700000000000}"#,
            )
            .create_async()
            .await;

        let client = test_client(server.url());
        let mut order = limit_order();
        order.order_type = OrderType::Market;
        let ack = client.place_market_order(&order).await.unwrap();
        assert_eq!(ack.status, OrderStatus::Filled);
        assert_eq!(ack.price, dec!(42123.5));
    }

    #[tokio::test]
    async fn test_would_trigger_rejection_classified() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", ORDER_PATH)
            .match_query(mockito::Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code":-2021,"msg":"Order would immediately trigger."}"#)
            .create_async()
            .await;

        let client = test_client(server.url());
        let err = client.place_limit_order(&limit_order()).await.unwrap_err();
        assert!(err.is_would_trigger());
    }

    #[tokio::test]
    async fn test_get_order_not_found_is_none() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", ORDER_PATH)
            .match_query(mockito::Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code":-2013,"msg":"Order does not exist."}"#)
            .create_async()
            .await;

        let client = test_client(server.url());
        let found = client.get_order("BTCUSDT", "c1", "").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_trades_list_maps_fills() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", USER_TRADES_PATH)
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"[{"id":70,"orderId":5001,"symbol":"BTCUSDT","price":"42000","qty":"0.5","commission":"0.2","commissionAsset":"USDT","time":1700000000000}]"#,
            )
            .create_async()
            .await;

        let client = test_client(server.url());
        let fills = client.get_trades_list("BTCUSDT", 100).await.unwrap();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].order_ref_id, "5001");
        assert_eq!(fills[0].commission, dec!(0.2));
        assert_eq!(fills[0].commission_asset, "USDT");
    }

    #[tokio::test]
    async fn test_read_path_retries_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", ACCOUNT_PATH)
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .with_body("busy")
            .expect(3)
            .create_async()
            .await;

        let retry = RetryConfig {
            max_retries: 2,
            max_delay: Duration::from_millis(10),
            add_jitter: false,
            ..Default::default()
        };
        let client = test_client(server.url()).with_retry_config(retry);
        let err = client.get_account_info().await.unwrap_err();
        assert!(err.is_retryable());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_order_submission_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", ORDER_PATH)
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .with_body("busy")
            .expect(1)
            .create_async()
            .await;

        let client = test_client(server.url());
        let err = client.place_limit_order(&limit_order()).await.unwrap_err();
        assert!(err.is_retryable());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_listen_key_lifecycle() {
        let mut server = mockito::Server::new_async().await;
        let _create = server
            .mock("POST", LISTEN_KEY_PATH)
            .with_status(200)
            .with_body(r#"{"listenKey":"abc123"}"#)
            .create_async()
            .await;
        let _keepalive = server
            .mock("PUT", LISTEN_KEY_PATH)
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = test_client(server.url());
        let token = client.start_user_data_stream().await.unwrap();
        assert_eq!(token, "abc123");
        client.keepalive_user_data_stream(&token).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_positions_filter_zero() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", POSITION_RISK_PATH)
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"[
                    {"symbol":"BTCUSDT","positionAmt":"1.5","entryPrice":"42000","markPrice":"42100","positionSide":"LONG","updateTime":1700000000000},
                    {"symbol":"ETHUSDT","positionAmt":"0","entryPrice":"0","markPrice":"2200","positionSide":"SHORT","updateTime":1700000000000}
                ]"#,
            )
            .create_async()
            .await;

        let client = test_client(server.url());
        let positions = client.get_open_positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].symbol, "BTCUSDT");
        assert_eq!(positions[0].amount, dec!(1.5));
    }

    #[test]
    fn test_config_debug_masks_credentials() {
        let config = FuturesClientConfig::new(
            "real-key",
            SecretString::from("real-secret".to_string()),
        );
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("real-key"));
        assert!(!rendered.contains("real-secret"));
    }
}
