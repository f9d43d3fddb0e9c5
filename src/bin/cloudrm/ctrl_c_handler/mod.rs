// Ctrl+C during a cloudrm run cancels the pipeline token. The scheduler then
// stops queueing resources, destroy workers exit after their current call,
// and resource types not yet reached are skipped. The run ends as cancelled
// (exit 0). The task also ends quietly when the pipeline finishes first.

use cloudrm_rs::PipelineCancellationToken;
use tokio::task::JoinHandle;
use tokio::{select, signal};
use tracing::{debug, warn};

pub fn spawn_ctrl_c_handler(cancellation_token: PipelineCancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        select! {
            _ = cancellation_token.cancelled() => {
                debug!("cancellation_token canceled.")
            }
            _ = signal::ctrl_c() => {
                warn!("ctrl-c received, finishing in-flight deletions and stopping.");
                cancellation_token.cancel();
            }
        }
    })
}
