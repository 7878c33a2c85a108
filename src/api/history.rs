use crate::api::AppState;
use crate::api::dto::history::{InboxEntryView, MessageView};
use crate::error::Result;
use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct DirectParams {
    pub peer: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupParams {
    pub user_id: Uuid,
}

pub async fn inbox(State(state): State<AppState>, Path(user_id): Path<Uuid>) -> Result<impl IntoResponse> {
    let entries = state.history_service.inbox(user_id, OffsetDateTime::now_utc()).await?;
    Ok(Json(entries.into_iter().map(InboxEntryView::from).collect::<Vec<_>>()))
}

pub async fn direct_history(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<DirectParams>,
) -> Result<impl IntoResponse> {
    let messages = state.history_service.direct_history(user_id, &params.peer, OffsetDateTime::now_utc()).await?;
    Ok(Json(messages.into_iter().map(MessageView::from).collect::<Vec<_>>()))
}

pub async fn group_history(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Query(params): Query<GroupParams>,
) -> Result<impl IntoResponse> {
    let messages = state.history_service.group_history(group_id, params.user_id, OffsetDateTime::now_utc()).await?;
    Ok(Json(messages.into_iter().map(MessageView::from).collect::<Vec<_>>()))
}
