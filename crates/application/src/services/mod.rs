mod application_intake;

pub use application_intake::{
    ApplicationIntakeDependencies, ApplicationIntakeService, CreateProjectRequest,
    IntakeSettings, SubmitApplicationRequest, UpdateStatusRequest,
};
