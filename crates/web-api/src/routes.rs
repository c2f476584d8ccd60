use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use uuid::Uuid;
use validator::Validate;

use application::{CreateProjectRequest, QueueStats, SubmitApplicationRequest, UpdateStatusRequest};
use domain::{ApplicationId, ApplicationStatus, ProjectId, ProjectStatus};

use crate::{
    actor::Actor,
    dto::{ApplicationDto, ProjectDto},
    error::ApiError,
    state::AppState,
};

#[derive(Debug, Deserialize, Validate)]
struct CreateProjectPayload {
    #[validate(length(min = 1, max = 200))]
    title: String,
    status: Option<ProjectStatus>,
    #[validate(range(min = 1))]
    max_applicants: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
struct SubmitApplicationPayload {
    #[validate(length(min = 1, max = 5000))]
    cover_letter: String,
    #[validate(url)]
    resume_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
struct UpdateStatusPayload {
    status: ApplicationStatus,
    #[validate(length(max = 2000))]
    reason: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/projects", post(create_project))
        .route("/projects/{project_id}", get(get_project))
        .route(
            "/projects/{project_id}/applications",
            post(submit_application).get(list_applications),
        )
        .route("/applications/{application_id}", get(get_application))
        .route(
            "/applications/{application_id}/status",
            patch(update_application_status),
        )
        .route("/admin/queue", get(queue_stats))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn create_project(
    State(state): State<AppState>,
    Actor(owner_id): Actor,
    Json(payload): Json<CreateProjectPayload>,
) -> Result<(StatusCode, Json<ProjectDto>), ApiError> {
    payload.validate()?;

    let project = state
        .intake_service
        .create_project(CreateProjectRequest {
            owner_id,
            title: payload.title,
            status: payload.status.unwrap_or(ProjectStatus::Published),
            max_applicants: payload.max_applicants,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ProjectDto::from(&project))))
}

async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectDto>, ApiError> {
    let project = state
        .intake_service
        .get_project(ProjectId::from(project_id))
        .await?;
    Ok(Json(ProjectDto::from(&project)))
}

async fn submit_application(
    State(state): State<AppState>,
    Actor(student_id): Actor,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<SubmitApplicationPayload>,
) -> Result<(StatusCode, Json<ApplicationDto>), ApiError> {
    payload.validate()?;

    let application = state
        .intake_service
        .submit(SubmitApplicationRequest {
            project_id: ProjectId::from(project_id),
            student_id,
            cover_letter: payload.cover_letter,
            resume_url: payload.resume_url,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ApplicationDto::from(&application))))
}

async fn list_applications(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<ApplicationDto>>, ApiError> {
    let applications = state
        .intake_service
        .list_project_applications(ProjectId::from(project_id), actor_id)
        .await?;

    Ok(Json(applications.iter().map(ApplicationDto::from).collect()))
}

async fn get_application(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Path(application_id): Path<Uuid>,
) -> Result<Json<ApplicationDto>, ApiError> {
    let application = state
        .intake_service
        .get_application(ApplicationId::from(application_id), actor_id)
        .await?;
    Ok(Json(ApplicationDto::from(&application)))
}

async fn update_application_status(
    State(state): State<AppState>,
    Actor(actor_id): Actor,
    Path(application_id): Path<Uuid>,
    Json(payload): Json<UpdateStatusPayload>,
) -> Result<Json<ApplicationDto>, ApiError> {
    payload.validate()?;

    let application = state
        .intake_service
        .update_status(UpdateStatusRequest {
            application_id: ApplicationId::from(application_id),
            actor_id,
            new_status: payload.status,
            reason: payload.reason,
        })
        .await?;

    Ok(Json(ApplicationDto::from(&application)))
}

async fn queue_stats(State(state): State<AppState>) -> Json<QueueStats> {
    Json(state.delivery_queue.stats().await)
}
