//! Bounded-latency health probe for a single proxy.

use crate::types::ProbeOutcome;
use engine::{Engine, ProbeError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Probe `name` against `url`, waiting at most `timeout`.
///
/// The URL test runs on its own task under a cancellation token and a
/// deadline of `timeout`. The caller races its result against an independent
/// timer; whichever fires first decides the outcome and the loser is
/// cancelled.
pub async fn probe(engine: &Engine, name: &str, url: &str, timeout: Duration) -> ProbeOutcome {
    let Some(proxy) = engine.proxy(name).await else {
        debug!(proxy = name, "Probe target not found");
        return ProbeOutcome::Missing;
    };

    let token = CancellationToken::new();
    let (result_tx, result_rx) = oneshot::channel();

    let task_token = token.child_token();
    let url = url.to_string();
    tokio::spawn(async move {
        let result = tokio::select! {
            _ = task_token.cancelled() => Err(ProbeError::Cancelled),
            result = tokio::time::timeout(timeout, proxy.url_test(&url)) => {
                result.unwrap_or(Err(ProbeError::DeadlineExceeded))
            }
        };
        // The receiver is gone once the race is decided.
        let _ = result_tx.send(result);
    });

    let outcome = tokio::select! {
        result = result_rx => match result {
            Ok(Ok(latency)) => ProbeOutcome::Latency(latency),
            Ok(Err(ProbeError::DeadlineExceeded)) => ProbeOutcome::TimedOut,
            Ok(Err(e)) => ProbeOutcome::Failed(e),
            Err(_) => ProbeOutcome::Failed(ProbeError::Cancelled),
        },
        _ = tokio::time::sleep(timeout) => ProbeOutcome::TimedOut,
    };
    token.cancel();

    debug!(proxy = name, outcome = outcome.as_str(), millis = outcome.millis(), "Probe finished");
    outcome
}
