mod error;
mod smart;

use crate::core::models::VehicleCollection;
use async_trait::async_trait;

pub use error::{FailureClass, FetchError};
pub use smart::SmartClient;

#[async_trait]
pub trait VehicleClient: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch_vehicles(&self) -> Result<VehicleCollection, FetchError>;
}
