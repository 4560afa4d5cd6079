//! Postgres 주문 저장소.
//!
//! 주문 행의 유일한 영속 기록입니다. 모든 활성 주문 조회는
//! `close_time IS NULL`을 기준으로 하며, 부분 갱신은 값이 있는 필드만
//! `COALESCE`로 반영합니다. 스키마는 `migrations/0001_orders.sql` 참조.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, QueryBuilder};
use tracing::{debug, instrument};

use oms_core::domain::{
    Order, OrderPatch, OrderStatus, OrderStore, OrderType, PositionSide, Side, SiblingQuery,
};
use oms_core::error::StoreError;

/// SELECT 공통 컬럼 목록. 스키마 순서와 일치합니다.
const ORDER_COLUMNS: &str = "id, ref_id, exchange, bot_id, symbol, side, position_side, \
order_type, status, qty, open_price, stop_price, close_price, commission, commission_asset, \
pl, open_order_id, close_order_id, open_time, close_time, update_time, note";

// =============================================================================
// 설정
// =============================================================================

/// Postgres 연결 설정.
#[derive(Debug, Clone)]
pub struct PgStoreConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl Default for PgStoreConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/oms".to_string(),
            max_connections: 5,
        }
    }
}

// =============================================================================
// 레코드
// =============================================================================

/// 주문 데이터베이스 레코드. 열거형은 TEXT로 저장됩니다.
#[derive(Debug, Clone, FromRow)]
struct OrderRow {
    id: String,
    ref_id: String,
    exchange: String,
    bot_id: String,
    symbol: String,
    side: String,
    position_side: String,
    order_type: String,
    status: String,
    qty: Decimal,
    open_price: Decimal,
    stop_price: Decimal,
    close_price: Decimal,
    commission: Decimal,
    commission_asset: Option<String>,
    pl: Decimal,
    open_order_id: Option<String>,
    close_order_id: Option<String>,
    open_time: DateTime<Utc>,
    close_time: Option<DateTime<Utc>>,
    update_time: DateTime<Utc>,
    note: Option<String>,
}

impl OrderRow {
    /// 도메인 객체로 변환. 알 수 없는 열거형 문자열은 저장소 손상으로
    /// 간주하고 에러를 반환합니다.
    fn into_order(self) -> Result<Order, StoreError> {
        let side = Side::parse(&self.side)
            .ok_or_else(|| StoreError::Serialization(format!("알 수 없는 side: {}", self.side)))?;
        let position_side = PositionSide::parse(&self.position_side).ok_or_else(|| {
            StoreError::Serialization(format!("알 수 없는 position_side: {}", self.position_side))
        })?;
        let order_type = OrderType::parse(&self.order_type).ok_or_else(|| {
            StoreError::Serialization(format!("알 수 없는 order_type: {}", self.order_type))
        })?;
        let status = OrderStatus::parse(&self.status).ok_or_else(|| {
            StoreError::Serialization(format!("알 수 없는 status: {}", self.status))
        })?;

        Ok(Order {
            id: self.id,
            ref_id: self.ref_id,
            exchange: self.exchange,
            bot_id: self.bot_id,
            symbol: self.symbol,
            side,
            position_side,
            order_type,
            status,
            qty: self.qty,
            open_price: self.open_price,
            stop_price: self.stop_price,
            close_price: self.close_price,
            commission: self.commission,
            commission_asset: self.commission_asset,
            pl: self.pl,
            open_order_id: self.open_order_id,
            close_order_id: self.close_order_id,
            open_time: self.open_time,
            close_time: self.close_time,
            update_time: self.update_time,
            note: self.note,
        })
    }
}

fn rows_into_orders(rows: Vec<OrderRow>) -> Result<Vec<Order>, StoreError> {
    rows.into_iter().map(OrderRow::into_order).collect()
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

// =============================================================================
// PgOrderStore
// =============================================================================

/// Postgres 기반 주문 저장소.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// 기존 풀로 저장소를 생성합니다.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 설정으로 연결 풀을 만들어 저장소를 생성합니다.
    pub async fn connect(config: &PgStoreConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self::new(pool))
    }

    /// 연결 풀 종료. 데몬 종료 경로에서 호출합니다.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    #[instrument(skip(self, order), fields(id = %order.id, symbol = %order.symbol))]
    async fn create_order(&self, order: &Order) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders (
                id, ref_id, exchange, bot_id, symbol, side, position_side,
                order_type, status, qty, open_price, stop_price, close_price,
                commission, commission_asset, pl, open_order_id, close_order_id,
                open_time, close_time, update_time, note
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21, $22)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&order.id)
        .bind(&order.ref_id)
        .bind(&order.exchange)
        .bind(&order.bot_id)
        .bind(&order.symbol)
        .bind(order.side.as_str())
        .bind(order.position_side.as_str())
        .bind(order.order_type.as_str())
        .bind(order.status.as_str())
        .bind(order.qty)
        .bind(order.open_price)
        .bind(order.stop_price)
        .bind(order.close_price)
        .bind(order.commission)
        .bind(&order.commission_asset)
        .bind(order.pl)
        .bind(&order.open_order_id)
        .bind(&order.close_order_id)
        .bind(order.open_time)
        .bind(order.close_time)
        .bind(order.update_time)
        .bind(&order.note)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, patch), fields(id = %patch.id))]
    async fn update_order(&self, patch: &OrderPatch) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET
                ref_id = COALESCE($2, ref_id),
                status = COALESCE($3, status),
                open_price = COALESCE($4, open_price),
                close_price = COALESCE($5, close_price),
                commission = COALESCE($6, commission),
                commission_asset = COALESCE($7, commission_asset),
                pl = COALESCE($8, pl),
                close_order_id = COALESCE($9, close_order_id),
                open_time = COALESCE($10, open_time),
                close_time = COALESCE($11, close_time),
                update_time = COALESCE($12, update_time),
                note = COALESCE($13, note)
            WHERE id = $1
            "#,
        )
        .bind(&patch.id)
        .bind(&patch.ref_id)
        .bind(patch.status.map(|s| s.as_str().to_string()))
        .bind(patch.open_price)
        .bind(patch.close_price)
        .bind(patch.commission)
        .bind(&patch.commission_asset)
        .bind(patch.pl)
        .bind(&patch.close_order_id)
        .bind(patch.open_time)
        .bind(patch.close_time)
        .bind(patch.update_time)
        .bind(&patch.note)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let updated = result.rows_affected() > 0;
        if !updated {
            debug!(id = %patch.id, "갱신 대상 주문 없음");
        }
        Ok(updated)
    }

    async fn get_order(&self, id: &str) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(OrderRow::into_order).transpose()
    }

    async fn get_new_orders(
        &self,
        exchange: &str,
        bot_id: Option<&str>,
    ) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM orders
            WHERE exchange = $1
              AND status = 'NEW'
              AND close_time IS NULL
              AND ($2::text IS NULL OR bot_id = $2)
            ORDER BY open_time ASC
            "#,
            ORDER_COLUMNS
        ))
        .bind(exchange)
        .bind(bot_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows_into_orders(rows)
    }

    async fn get_open_orders(
        &self,
        exchange: &str,
        bot_id: Option<&str>,
    ) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM orders
            WHERE exchange = $1
              AND close_time IS NULL
              AND ($2::text IS NULL OR bot_id = $2)
            ORDER BY open_time ASC
            "#,
            ORDER_COLUMNS
        ))
        .bind(exchange)
        .bind(bot_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows_into_orders(rows)
    }

    async fn get_sibling_orders(&self, query: &SiblingQuery) -> Result<Vec<Order>, StoreError> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM orders WHERE exchange = ",
            ORDER_COLUMNS
        ));
        builder.push_bind(&query.exchange);

        if let Some(bot_id) = &query.bot_id {
            builder.push(" AND bot_id = ");
            builder.push_bind(bot_id);
        }
        if let Some(symbol) = &query.symbol {
            builder.push(" AND symbol = ");
            builder.push_bind(symbol);
        }
        if let Some(side) = query.position_side {
            builder.push(" AND position_side = ");
            builder.push_bind(side.as_str());
        }
        if let Some(open_order_id) = &query.open_order_id {
            builder.push(" AND open_order_id = ");
            builder.push_bind(open_order_id);
        }
        if query.open_only {
            builder.push(" AND close_time IS NULL");
        }
        builder.push(" ORDER BY open_time ASC");

        let rows: Vec<OrderRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows_into_orders(rows)
    }

    async fn get_expired_orders(
        &self,
        exchange: &str,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM orders
            WHERE exchange = $1
              AND close_time IS NULL
              AND open_time < $2
            ORDER BY open_time ASC
            "#,
            ORDER_COLUMNS
        ))
        .bind(exchange)
        .bind(older_than)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows_into_orders(rows)
    }

    #[instrument(skip(self))]
    async fn delete_canceled_orders(
        &self,
        exchange: &str,
        before: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM orders
            WHERE exchange = $1
              AND status = 'CANCELED'
              AND close_time IS NOT NULL
              AND close_time < $2
            "#,
        )
        .bind(exchange)
        .bind(before)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_row_conversion() {
        let row = OrderRow {
            id: "100".to_string(),
            ref_id: "900".to_string(),
            exchange: "binance".to_string(),
            bot_id: "bot-a".to_string(),
            symbol: "BTCUSDT".to_string(),
            side: "BUY".to_string(),
            position_side: "LONG".to_string(),
            order_type: "STOP_LOSS_LIMIT".to_string(),
            status: "NEW".to_string(),
            qty: Decimal::ONE,
            open_price: Decimal::new(42000, 0),
            stop_price: Decimal::new(41000, 0),
            close_price: Decimal::ZERO,
            commission: Decimal::ZERO,
            commission_asset: None,
            pl: Decimal::ZERO,
            open_order_id: Some("99".to_string()),
            close_order_id: None,
            open_time: Utc::now(),
            close_time: None,
            update_time: Utc::now(),
            note: None,
        };

        let order = row.into_order().unwrap();
        assert_eq!(order.side, Side::Buy);
        assert_eq!(order.order_type, OrderType::StopLossLimit);
        assert_eq!(order.status, OrderStatus::New);
        assert!(order.is_open());
        assert!(order.is_closing_order());
    }

    #[test]
    fn test_order_row_rejects_unknown_enum() {
        let row = OrderRow {
            id: "100".to_string(),
            ref_id: String::new(),
            exchange: "binance".to_string(),
            bot_id: "bot-a".to_string(),
            symbol: "BTCUSDT".to_string(),
            side: "HOLD".to_string(),
            position_side: "LONG".to_string(),
            order_type: "LIMIT".to_string(),
            status: "NEW".to_string(),
            qty: Decimal::ONE,
            open_price: Decimal::ZERO,
            stop_price: Decimal::ZERO,
            close_price: Decimal::ZERO,
            commission: Decimal::ZERO,
            commission_asset: None,
            pl: Decimal::ZERO,
            open_order_id: None,
            close_order_id: None,
            open_time: Utc::now(),
            close_time: None,
            update_time: Utc::now(),
            note: None,
        };

        assert!(matches!(
            row.into_order(),
            Err(StoreError::Serialization(_))
        ));
    }
}
