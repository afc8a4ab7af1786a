use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::ChatRequest;
use crate::core::exchange::ExchangeId;
use crate::core::transport::{SessionEvent, TransportOptions, TransportSession};

pub type StreamEvent = (SessionEvent, ExchangeId);

/// Everything the transport task needs for one exchange.
#[derive(Debug, Clone)]
pub struct StreamParams {
    pub endpoint: String,
    pub request: ChatRequest,
    pub options: TransportOptions,
    pub cancel_token: CancellationToken,
    pub exchange_id: ExchangeId,
}

#[derive(Clone)]
pub struct ChatStreamService {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Run one exchange on a background task. Its events arrive on the
    /// receiver tagged with the exchange id; `Closed` is always the last one.
    pub fn spawn_stream(&self, params: StreamParams) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let StreamParams {
                endpoint,
                request,
                options,
                cancel_token,
                exchange_id,
            } = params;

            let emit = |event: SessionEvent| {
                let name = event.name();
                debug!(exchange_id = %exchange_id, event = name, "Transport event");
                if tx.send((event, exchange_id)).is_err() {
                    debug!(exchange_id = %exchange_id, event = name, "Event receiver dropped");
                }
            };

            let mut session = TransportSession::new(endpoint, options);

            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {}
                _ = pump(&mut session, &request, &emit) => {}
            }

            // Cancelled mid-flight: closing early is reported as an error.
            if let Some(event) = session.force_close().await {
                emit(event);
            }
            while let Some(event) = session.next_event().await {
                emit(event);
            }
        });
    }

    #[cfg(test)]
    pub fn send_for_test(&self, event: SessionEvent, exchange_id: ExchangeId) {
        let _ = self.tx.send((event, exchange_id));
    }
}

/// Connect, send the request once, then forward events until the session
/// reports a terminal event.
async fn pump<F>(session: &mut TransportSession, request: &ChatRequest, emit: &F)
where
    F: Fn(SessionEvent),
{
    if let Err(err) = session.connect().await {
        emit(SessionEvent::Error(err));
        return;
    }
    emit(SessionEvent::Ready);

    if let Err(err) = session.send(request).await {
        // Report the send failure itself rather than a cancellation.
        let _ = session.force_close().await;
        emit(SessionEvent::Error(err));
        return;
    }

    while let Some(event) = session.next_event().await {
        let terminal = matches!(event, SessionEvent::Complete | SessionEvent::Error(_));
        emit(event);
        if terminal {
            return;
        }
    }
}
