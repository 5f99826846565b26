use std::future::Future;

use tokio::sync::{broadcast, mpsc};

use crate::error::AppResult;

/// Outcome of one spawned unit of delivery work.
#[derive(Debug)]
pub struct TaskReport {
    pub label: String,
    pub result: AppResult<()>,
}

/// Spawns delivery work without awaiting it; every task reports its outcome on a channel.
#[derive(Clone)]
pub struct DeliveryTasks {
    report_tx: mpsc::UnboundedSender<TaskReport>,
}

impl DeliveryTasks {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TaskReport>) {
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        (Self { report_tx }, report_rx)
    }

    pub fn spawn<F>(&self, label: impl Into<String>, work: F)
    where
        F: Future<Output = AppResult<()>> + Send + 'static,
    {
        let label = label.into();
        let report_tx = self.report_tx.clone();
        tokio::spawn(async move {
            let result = work.await;
            // Receiver may be gone during shutdown.
            let _ = report_tx.send(TaskReport { label, result });
        });
    }
}

/// Drains task reports, logging failures, until shutdown or every sender is dropped.
pub async fn log_reports(
    mut reports: mpsc::UnboundedReceiver<TaskReport>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::info!("Delivery report drain shutting down");
                break;
            }
            report = reports.recv() => match report {
                Some(TaskReport { label, result: Ok(()) }) => {
                    tracing::debug!("Delivery task {} finished", label);
                }
                Some(TaskReport { label, result: Err(e) }) => {
                    tracing::warn!("Delivery task {} failed: {}", label, e);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[tokio::test]
    async fn spawned_work_reports_its_result() {
        let (tasks, mut reports) = DeliveryTasks::new();
        tasks.spawn("ok", async { Ok(()) });
        tasks.spawn("bad", async {
            Err(AppError::ServerError("smtp unavailable".into()))
        });

        let mut failed = Vec::new();
        for _ in 0..2 {
            let report = reports.recv().await.unwrap();
            if report.result.is_err() {
                failed.push(report.label);
            }
        }
        assert_eq!(failed, vec!["bad".to_string()]);
    }

    #[tokio::test]
    async fn drain_stops_on_shutdown() {
        let (_tasks, reports) = DeliveryTasks::new();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let drain = tokio::spawn(log_reports(reports, shutdown_rx));
        shutdown_tx.send(()).unwrap();
        drain.await.unwrap();
    }
}
