use metrics::counter;
use roster_core::{Resource, Status};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ReconcileError;
use crate::runtime::Runtime;

/// Write `status` under `key` unless the persisted record is already equal.
/// Returns whether a write happened.
pub(crate) async fn publish(
    cx: &CancellationToken,
    rt: &Runtime,
    res: &Resource,
    key: &'static str,
    status: Status,
    controller: &'static str,
) -> Result<bool, ReconcileError> {
    if res.status.get(key) == Some(&status) {
        counter!("status_writes_skipped_total", 1u64, "controller" => controller);
        return Ok(false);
    }
    rt.write_status(cx, &res.id, key, status).await?;
    counter!("status_writes_total", 1u64, "controller" => controller);
    debug!(id = %res.id, key, controller, "status published");
    Ok(true)
}
