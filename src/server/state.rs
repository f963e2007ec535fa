//! Shared application state for the HTTP handlers

use crate::application::ReportService;

pub struct AppState {
    pub service: ReportService,
}

impl AppState {
    pub fn new(service: ReportService) -> Self {
        Self { service }
    }
}
