use domain::{Application, ApplicationStatus, Project, ProjectStatus, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDto {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub status: ProjectStatus,
    pub max_applicants: Option<u32>,
    pub current_applicants: u32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<&Project> for ProjectDto {
    fn from(project: &Project) -> Self {
        Self {
            id: Uuid::from(project.id),
            owner_id: Uuid::from(project.owner_id),
            title: project.title.clone(),
            status: project.status,
            max_applicants: project.max_applicants,
            current_applicants: project.current_applicants,
            created_at: project.created_at,
            updated_at: project.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationDto {
    pub id: Uuid,
    pub project_id: Uuid,
    pub student_id: Uuid,
    pub cover_letter: String,
    pub resume_url: Option<String>,
    pub status: ApplicationStatus,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<&Application> for ApplicationDto {
    fn from(application: &Application) -> Self {
        Self {
            id: Uuid::from(application.id),
            project_id: Uuid::from(application.project_id),
            student_id: Uuid::from(application.student_id),
            cover_letter: application.cover_letter.clone(),
            resume_url: application.resume_url.clone(),
            status: application.status,
            rejection_reason: application.rejection_reason.clone(),
            reviewed_by: application.reviewed_by.map(Uuid::from),
            reviewed_at: application.reviewed_at,
            created_at: application.created_at,
            updated_at: application.updated_at,
        }
    }
}
