//! Folding a streamed model call into a [`ModelResponse`].

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::time::{self, Duration};

use crate::error::{BatonError, ErrorCode, Result};
use crate::types::{ModelResponse, ModelStreamEvent};

/// Drive `stream` to completion, passing every event to `on_event`.
///
/// Returns the response carried by the `Done` event. Events after `Done` are
/// ignored. A stream that ends without `Done` is a malformed backend response;
/// a gap longer than `idle_timeout` between events is
/// [`BatonError::StreamIdleTimeout`].
pub async fn fold_stream<F>(
    mut stream: BoxStream<'static, Result<ModelStreamEvent>>,
    idle_timeout: Option<Duration>,
    mut on_event: F,
) -> Result<ModelResponse>
where
    F: FnMut(&ModelStreamEvent),
{
    let mut idle_sleep = idle_timeout.map(|d| Box::pin(time::sleep(d)));
    loop {
        let next = match (idle_sleep.as_mut(), idle_timeout) {
            (Some(sleep), Some(timeout)) => {
                tokio::select! {
                    _ = sleep.as_mut() => {
                        return Err(BatonError::StreamIdleTimeout(timeout.as_millis() as u64));
                    }
                    next = stream.next() => {
                        sleep.as_mut().reset(time::Instant::now() + timeout);
                        next
                    }
                }
            }
            _ => stream.next().await,
        };

        let Some(event) = next else {
            return Err(BatonError::backend_fatal(
                ErrorCode::MalformedResponse,
                "model stream ended without a completion event",
            ));
        };
        let event = event?;
        on_event(&event);
        if let ModelStreamEvent::Done { response } = event {
            return Ok(response);
        }
    }
}
