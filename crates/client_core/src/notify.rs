use tracing::{error, info, warn};

pub trait NotificationSink: Send + Sync {
    fn success(&self, message: &str, detail: &str);
    fn warn(&self, message: &str, detail: &str);
    fn error(&self, message: &str, detail: &str);
}

/// Routes notifications into the tracing pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn success(&self, message: &str, detail: &str) {
        info!(target: "notifications", detail, "{message}");
    }

    fn warn(&self, message: &str, detail: &str) {
        warn!(target: "notifications", detail, "{message}");
    }

    fn error(&self, message: &str, detail: &str) {
        error!(target: "notifications", detail, "{message}");
    }
}
