//! Order execution collaborator used in live mode.

use async_trait::async_trait;
use stratforge_core::domain::{Fill, OrderRequest};

use crate::error::ExecutionFault;

/// Submits orders to a venue and waits for the confirmation.
///
/// Implementations own retries, authentication and wire formats; the engine
/// only sees the confirmed `Fill` or the fault.
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    async fn submit(&self, order: &OrderRequest) -> Result<Fill, ExecutionFault>;
}
