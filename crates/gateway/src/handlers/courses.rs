//! Course handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{optional, required, ApiJson};
use crate::AppState;
use cognify_common::{
    auth::AuthUser,
    db::{models::Course, CourseWithDocuments},
    errors::{AppError, Result},
};

/// Request to create a course
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCourseRequest {
    #[validate(length(max = 500))]
    pub title: Option<String>,

    #[validate(length(max = 10000))]
    pub description: Option<String>,
}

/// Parse a path id; malformed ids are a client error
pub(crate) fn parse_id(raw: &str, field: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::Validation {
        message: format!("{} must be a UUID", field),
        field: Some(field.to_string()),
    })
}

/// Create a course owned by the caller
pub async fn create_course(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(request): ApiJson<CreateCourseRequest>,
) -> Result<(StatusCode, Json<Course>)> {
    let title = required(&request.title, "title")?;
    request.validate()?;

    let course = state
        .repo
        .create_course(auth.user_id, title, optional(&request.description))
        .await?;

    tracing::info!(
        course_id = %course.id,
        user_id = %auth.user_id,
        request_id = %auth.request_id,
        "Course created"
    );

    Ok((StatusCode::CREATED, Json(course)))
}

/// List the caller's courses
pub async fn list_courses(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Course>>> {
    let courses = state.repo.list_courses_for_user(auth.user_id).await?;
    Ok(Json(courses))
}

/// A course and its documents
pub async fn get_course(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(course_id): Path<String>,
) -> Result<Json<CourseWithDocuments>> {
    let course_id = parse_id(&course_id, "id")?;

    let detail = state
        .repo
        .get_course_with_documents(course_id, auth.user_id)
        .await?;

    Ok(Json(detail))
}
