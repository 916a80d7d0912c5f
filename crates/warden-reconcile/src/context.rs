use crate::pacing::Pacing;
use crate::retry::{RetryPolicy, RetryableCaller};
use std::sync::Arc;
use warden_api::PlatformApi;

/// Shared, read-only dependencies handed to every component.
///
/// Cloning is cheap; the platform client sits behind an `Arc`.
#[derive(Clone)]
pub struct ReconcileContext {
    pub caller: RetryableCaller,
    pub pacing: Pacing,
}

impl ReconcileContext {
    pub fn new(api: Arc<dyn PlatformApi>, retry: RetryPolicy, pacing: Pacing) -> Self {
        Self {
            caller: RetryableCaller::new(api, retry),
            pacing,
        }
    }
}
