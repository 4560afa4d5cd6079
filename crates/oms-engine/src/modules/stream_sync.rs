//! 사용자 데이터 스트림 수명주기.
//!
//! 토큰 발급, 웹소켓 연결, keepalive, 주기적 재발급의 전체 순환을 한
//! 태스크가 소유합니다. 재발급 주기는 토큰 수명보다 짧아야 하며, 그 경우
//! 만료 통지는 받을 일이 없고 받더라도 즉시 복구합니다. 연결이 없는 동안의
//! 공백은 폴링 리컨실레이션이 메웁니다.

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use oms_core::{ExchangeClient, StreamEvent};
use oms_exchange::UserDataStream;
use oms_notification::NotificationEvent;

use crate::context::ServiceContext;
use crate::error::{EngineError, Result};
use crate::modules::reconcile;

// =============================================================================
// 세션
// =============================================================================

/// 열린 스트림 세션의 핸들 묶음. 토큰 하나에 1:1로 대응합니다.
struct StreamSession {
    token: String,
    events: mpsc::Receiver<StreamEvent>,
    stop: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

/// 토큰을 발급받고 웹소켓 연결 태스크를 띄웁니다.
async fn open_session(ctx: &ServiceContext, stream_url: &str) -> Result<StreamSession> {
    let token = ctx.exchange.start_user_data_stream().await?;

    let mut stream = UserDataStream::new(stream_url, &token);
    let events = stream
        .take_receiver()
        .ok_or_else(|| EngineError::Stream("이벤트 수신 채널이 이미 소비되었습니다".to_string()))?;
    let stop = stream.stop_handle();
    let task = tokio::spawn(async move {
        stream.connect().await;
    });

    info!(token = %mask_token(&token), "사용자 데이터 스트림 세션 시작");
    Ok(StreamSession {
        token,
        events,
        stop,
        task,
    })
}

/// 세션 종료. 토큰 폐기와 태스크 정리 모두 best-effort입니다.
async fn teardown_session(ctx: &ServiceContext, session: Option<StreamSession>) {
    let session = match session {
        Some(session) => session,
        None => return,
    };
    let _ = session.stop.send(()).await;
    if let Err(e) = ctx.exchange.stop_user_data_stream(&session.token).await {
        debug!(error = %e, "스트림 토큰 폐기 실패");
    }
    session.task.abort();
}

/// 기존 세션을 내리고 새 토큰으로 다시 엽니다. 실패하면 세션 없이 물러나
/// 다음 갱신 틱에 다시 시도합니다.
async fn rotate_session(
    ctx: &ServiceContext,
    stream_url: &str,
    session: Option<StreamSession>,
) -> Option<StreamSession> {
    teardown_session(ctx, session).await;
    match open_session(ctx, stream_url).await {
        Ok(open) => Some(open),
        Err(e) => {
            // 세션 없는 동안 푸시 경로가 끊기므로 운영자에게 알린다
            warn!(error = %e, "스트림 재연결 실패, 다음 갱신 틱에 재시도");
            ctx.notify(NotificationEvent::SystemError {
                error_code: "STREAM_RECONNECT".to_string(),
                message: e.to_string(),
            })
            .await;
            None
        }
    }
}

/// 세션이 있으면 다음 이벤트를, 없으면 영원히 대기합니다.
async fn next_event(session: &mut Option<StreamSession>) -> Option<StreamEvent> {
    match session {
        Some(open) => open.events.recv().await,
        None => std::future::pending().await,
    }
}

// =============================================================================
// 수명주기 루프
// =============================================================================

/// 스트림 수명주기 루프. 종료 신호를 받을 때까지 실행됩니다.
pub async fn run_stream_lifecycle(
    ctx: ServiceContext,
    stream_url: String,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let mut session = match open_session(&ctx, &stream_url).await {
        Ok(open) => Some(open),
        Err(e) => {
            warn!(error = %e, "스트림 최초 연결 실패, 갱신 틱에 재시도");
            None
        }
    };

    let mut refresh = tokio::time::interval(ctx.config.intervals.stream_refresh());
    refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    refresh.tick().await;

    let mut keepalive = tokio::time::interval(ctx.config.intervals.stream_keepalive());
    keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    keepalive.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,

            _ = refresh.tick() => {
                // 토큰 수명보다 짧은 주기의 선제 재발급
                session = rotate_session(&ctx, &stream_url, session).await;
            }

            _ = keepalive.tick() => {
                if let Some(open) = &session {
                    if let Err(e) = ctx.exchange.keepalive_user_data_stream(&open.token).await {
                        warn!(error = %e, "스트림 토큰 연장 실패");
                    }
                }
            }

            event = next_event(&mut session) => match event {
                Some(StreamEvent::OrderUpdate(update)) => {
                    if let Err(e) = reconcile::handle_stream_event(&ctx, &update).await {
                        warn!(
                            client_order_id = %update.client_order_id,
                            error = %e,
                            "스트림 이벤트 반영 실패"
                        );
                    }
                }
                Some(StreamEvent::ListenKeyExpired) => {
                    warn!("스트림 토큰 만료 통지, 즉시 재발급");
                    session = rotate_session(&ctx, &stream_url, session).await;
                }
                Some(StreamEvent::Disconnected(reason)) => {
                    warn!(reason = %reason, "스트림 연결 끊김, 재연결");
                    session = rotate_session(&ctx, &stream_url, session).await;
                }
                None => {
                    warn!("스트림 이벤트 채널 닫힘, 다음 갱신 틱에 재연결");
                    teardown_session(&ctx, session.take()).await;
                }
            }
        }
    }

    // 종료 경로에서도 토큰과 연결은 반드시 정리한다
    teardown_session(&ctx, session).await;
    info!("사용자 데이터 스트림 수명주기 종료");
    Ok(())
}

/// 로그용 토큰 마스킹. 앞 8자만 남깁니다.
fn mask_token(token: &str) -> String {
    if token.len() <= 8 {
        return "****".to_string();
    }
    format!("{}****", &token[..8])
}

// =============================================================================
// 테스트
// =============================================================================
