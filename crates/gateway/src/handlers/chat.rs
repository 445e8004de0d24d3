//! Study assistant chat handler

use axum::{extract::State, Json};
use serde::Deserialize;

use super::{courses::parse_id, required, ApiJson};
use crate::AppState;
use cognify_common::{
    auth::AuthUser,
    errors::{AppError, Result},
    rag::RagAnswer,
    TenantFilter,
};

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: String,
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(rename = "courseId")]
    pub course_id: Option<String>,
}

/// The question is the content of the last message, whatever its role
fn last_question(messages: &[ChatMessage]) -> Result<&str> {
    let last = messages.last().ok_or_else(|| AppError::missing("messages"))?;
    required(&last.content, "messages")
}

/// Answer a question from the caller's material in one course
pub async fn chat(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(request): ApiJson<ChatRequest>,
) -> Result<Json<RagAnswer>> {
    let question = last_question(&request.messages)?;
    let course_id = parse_id(required(&request.course_id, "courseId")?, "courseId")?;

    let course = state
        .repo
        .find_course_for_user(course_id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::CourseNotFound {
            id: course_id.to_string(),
        })?;

    tracing::debug!(
        user_id = %auth.user_id,
        course_id = %course.id,
        request_id = %auth.request_id,
        turns = request.messages.len(),
        "Chat request"
    );

    let filter = TenantFilter::new(auth.user_id, course.id);
    let answer = state.rag.answer(question, &filter).await?;

    Ok(Json(answer))
}
