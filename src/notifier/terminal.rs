use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::NotifyError;
use crate::notifier::Notifier;

/// Writes signals to the log instead of delivering them anywhere.
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn name(&self) -> &str {
        "terminal"
    }

    fn send(&self, text: &str) -> BoxFuture<'_, Result<(), Report<NotifyError>>> {
        tracing::warn!("SIGNAL:\n{text}");
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn terminal_notifier_always_delivers() {
        let notifier = TerminalNotifier;
        assert!(notifier.send("<b>BTCUSDT</b> LONG").await.is_ok());
    }
}
