use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::time::{interval, Instant, MissedTickBehavior};

use kiro_types::models::ReleaseOutcome;
use kiro_types::protocol::{Dialect, StreamEvent};

use super::ByteStream;
use crate::proxy::credential_pool::CredentialLease;
use crate::proxy::mappers::canonical_events;
use crate::proxy::mappers::codewhisperer::CanonicalStreamBuilder;
use crate::proxy::mappers::streaming::{encoder_for, EncoderContext};
use crate::proxy::upstream::UpstreamEventStream;

/// SSE comment sent while the upstream is quiet, keeps idle proxies from
/// closing the connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const HEARTBEAT_FRAME: &[u8] = b": ping\n\n";

/// Pool outcome for a stream that ended with an `error` event of `error_type`.
pub fn outcome_for_error_type(error_type: &str) -> ReleaseOutcome {
    match error_type {
        "rate_limit_error" => ReleaseOutcome::RateLimited,
        "authentication_error" | "permission_error" => ReleaseOutcome::AuthFailure,
        "invalid_request_error" | "not_found_error" => ReleaseOutcome::Success,
        _ => ReleaseOutcome::ServerError,
    }
}

/// Relay a streaming reply to the client, holding `lease` until the last frame.
///
/// A client that disconnects early drops the stream and with it the lease.
/// Until the stop frame has been handed out the lease reports a failure;
/// after that it reports how the stream ended.
pub(super) fn relay_stream(
    dialect: Dialect,
    upstream: UpstreamEventStream,
    builder: CanonicalStreamBuilder,
    mut lease: CredentialLease,
    context: EncoderContext,
    deadline: Instant,
) -> ByteStream {
    let mut encoder = encoder_for(dialect, &context);
    let message_id = builder.message_id().to_string();
    let events = canonical_events(upstream, builder, Some(deadline));

    Box::pin(async_stream::stream! {
        futures::pin_mut!(events);

        let mut heartbeat = interval(HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        let mut outcome = ReleaseOutcome::Success;
        loop {
            // None: the upstream has been quiet for a full heartbeat interval
            let next = tokio::select! {
                next = events.next() => Some(next),
                _ = heartbeat.tick() => None,
            };

            let event = match next {
                None => {
                    yield Ok(Bytes::from_static(HEARTBEAT_FRAME));
                    continue;
                },
                Some(None) => break,
                Some(Some(event)) => event,
            };
            heartbeat.reset();

            if let StreamEvent::Error { error_type, .. } = &event {
                outcome = outcome_for_error_type(error_type);
                lease.set_default_outcome(outcome);
            }
            let terminal = matches!(event, StreamEvent::MessageStop);
            let frames = encoder.encode(&event);
            let last = frames.len().saturating_sub(1);
            for (i, frame) in frames.into_iter().enumerate() {
                // A disconnect after the stop frame is not the credential's fault
                if terminal && i == last {
                    lease.set_default_outcome(outcome);
                }
                yield Ok(frame);
            }
        }

        tracing::debug!("[{}] Stream relay finished | outcome: {}", message_id, outcome);
        lease.release(outcome);
    })
}
