use std::sync::Arc;

use application::{ApplicationIntakeService, DeliveryQueue};

#[derive(Clone)]
pub struct AppState {
    pub intake_service: Arc<ApplicationIntakeService>,
    pub delivery_queue: Arc<DeliveryQueue>,
}

impl AppState {
    pub fn new(
        intake_service: Arc<ApplicationIntakeService>,
        delivery_queue: Arc<DeliveryQueue>,
    ) -> Self {
        Self {
            intake_service,
            delivery_queue,
        }
    }
}
