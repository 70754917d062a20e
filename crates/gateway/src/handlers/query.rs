//! Question answering handler

use axum::{extract::State, Json};
use serde::Deserialize;
use validator::Validate;

use crate::services::QaAnswer;
use crate::AppState;
use docvault_common::{errors::Result, AuthenticatedTenant};

/// Query request
#[derive(Debug, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(min = 1, max = 2000))]
    pub question: String,
}

/// Answer a question from the caller's documents
pub async fn query(
    State(state): State<AppState>,
    auth: AuthenticatedTenant,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QaAnswer>> {
    request.validate()?;

    let answer = state.qa.answer(&auth.tenant_id, &request.question).await?;
    Ok(Json(answer))
}
