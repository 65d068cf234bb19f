use axum::Json;

use crate::api::response::{ApiError, AppJson, JSend};
use crate::auth::Caller;
use crate::course::{Course, CourseForm};

/// Validate a course form before it is persisted.
/// Route: POST /api/courses/validate (behind the guard)
pub async fn validate_course(
    Caller(identity): Caller,
    AppJson(form): AppJson<CourseForm>,
) -> Result<Json<JSend<Course>>, ApiError> {
    let course = form.validate().map_err(ApiError::Invalid)?;

    tracing::debug!(user_id = %identity.user_id, slug = %course.slug, "Validated course form");
    Ok(JSend::success(course))
}
