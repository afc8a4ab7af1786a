use tokio::sync::mpsc;
use tracing::warn;

use super::chat_stream::{ChatStreamService, StreamEvent, StreamParams};
use super::exchange::{ExchangeStatus, ProtocolViolation};
use super::session::{ChatSession, SessionUpdate};

/// Spawn the transport for `params` and apply its events to `session` until
/// the exchange is torn down. `on_update` sees every change as it happens.
///
/// Events left over from earlier exchanges are rejected by the session and
/// skipped here; they never touch the log. Any other violation is returned
/// once the session is idle again, so the caller can keep going.
pub async fn run_exchange<F>(
    session: &mut ChatSession,
    service: &ChatStreamService,
    rx: &mut mpsc::UnboundedReceiver<StreamEvent>,
    params: StreamParams,
    mut on_update: F,
) -> Result<ExchangeStatus, ProtocolViolation>
where
    F: FnMut(&SessionUpdate),
{
    let exchange_id = params.exchange_id;
    service.spawn_stream(params);

    let mut outcome = ExchangeStatus::Failed;
    let mut violation = None;
    while let Some((event, id)) = rx.recv().await {
        let update = match session.handle_event(id, event) {
            Ok(update) => update,
            Err(ProtocolViolation::NoActiveExchange { exchange }) if exchange != exchange_id => {
                continue;
            }
            Err(err) => {
                let err = violation.get_or_insert(err).clone();
                if session.is_idle() {
                    return Err(err);
                }
                // Settled but not torn down yet; wait for `Closed`.
                continue;
            }
        };

        match &update {
            SessionUpdate::Committed(_) => outcome = ExchangeStatus::Done,
            SessionUpdate::Failed { .. } => outcome = ExchangeStatus::Failed,
            SessionUpdate::Idle(status) => outcome = *status,
            SessionUpdate::Ready | SessionUpdate::Fragment(_) => {}
        }
        on_update(&update);

        if session.is_idle() {
            return match violation {
                Some(err) => Err(err),
                None => Ok(outcome),
            };
        }
    }

    // Every sender is gone without a `Closed`; treat it like a dropped link.
    warn!(exchange_id = %exchange_id, "Transport channel closed early");
    session.handle_event(exchange_id, super::transport::SessionEvent::Closed)?;
    violation.map_or(Ok(ExchangeStatus::Failed), Err)
}
