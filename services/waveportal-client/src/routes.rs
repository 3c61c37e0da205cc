use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;
use wp_sync::WaveBlocked;
use wp_types::{
    ConnectResponse, DraftRequest, NoticesResponse, StateResponse, WaveRequest, WaveResponse,
    WavesResponse,
};

use crate::{AppState, ApiResult, bad_request, conflict, not_found};

#[derive(Debug, Serialize)]
pub(crate) struct DismissResponse {
    id: Uuid,
    dismissed: bool,
}

pub(crate) async fn get_state(State(state): State<AppState>) -> Json<StateResponse> {
    let portal = &state.portal;
    let snapshot = portal.store().snapshot().await;
    Json(StateResponse {
        account: portal.account().await.map(|account| account.0),
        busy: portal.is_busy(),
        draft: portal.draft().await,
        total_count: snapshot.total_count,
        entries: snapshot.entries,
    })
}

pub(crate) async fn get_waves(State(state): State<AppState>) -> Json<WavesResponse> {
    let snapshot = state.portal.store().snapshot().await;
    Json(WavesResponse {
        total_count: snapshot.total_count,
        entries: snapshot.entries,
    })
}

pub(crate) async fn connect(State(state): State<AppState>) -> Json<ConnectResponse> {
    match state.portal.connect().await {
        Ok(session) => Json(ConnectResponse {
            connected: true,
            account: Some(session.account.0),
            notice: None,
        }),
        Err(_) => Json(ConnectResponse {
            connected: false,
            account: state.portal.account().await.map(|account| account.0),
            notice: state.portal.notices().list().await.pop(),
        }),
    }
}

pub(crate) async fn put_draft(
    State(state): State<AppState>,
    Json(request): Json<DraftRequest>,
) -> Json<DraftRequest> {
    state.portal.set_draft(request.message.clone()).await;
    Json(request)
}

/// Sends the body's `message`, or the stored draft when the body is empty
/// or omits it.
pub(crate) async fn wave(State(state): State<AppState>, body: Bytes) -> ApiResult<WaveResponse> {
    let request: WaveRequest = if body.is_empty() {
        WaveRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|_| bad_request("body must be a JSON object"))?
    };

    let outcome = state.portal.wave(request.message).await.map_err(|blocked| match blocked {
        WaveBlocked::Busy => conflict(&blocked.to_string()),
        WaveBlocked::NotConnected | WaveBlocked::EmptyMessage => bad_request(&blocked.to_string()),
    })?;

    info!("wave settled as {:?}", outcome.status);
    Ok(Json(WaveResponse {
        status: outcome.status,
        tx_hash: outcome.tx_hash.map(|hash| hash.0),
        total_count: outcome.total_count,
        error: outcome.error.map(|err| err.to_string()),
    }))
}

pub(crate) async fn list_notices(State(state): State<AppState>) -> Json<NoticesResponse> {
    Json(NoticesResponse {
        notices: state.portal.notices().list().await,
    })
}

pub(crate) async fn dismiss_notice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<DismissResponse> {
    if !state.portal.notices().dismiss(id).await {
        return Err(not_found("notice not found"));
    }
    Ok(Json(DismissResponse { id, dismissed: true }))
}
