//! Drive a dispatch from input to outcomes.

use crate::{
    batcher::Batcher,
    composer::Composer,
    config::Config,
    dispatcher::{Dispatcher, Summary},
    gateway::Gateway,
    limiter::Limiter,
    metrics::Metrics,
    outcome::Sink,
    sender::Sender,
    Error,
};
use std::{num::NonZeroUsize, sync::Arc};
use tokio::io::AsyncBufRead;
use tracing::{error, info};

/// Dispatch every phone read from `input` and record the outcomes to `sink`.
///
/// Workers are started before the first line is read. A failure to read `input` stops
/// reading and is returned once every batch read so far has completed.
pub async fn run<R, G, S>(
    config: Arc<Config>,
    input: R,
    gateway: G,
    sink: S,
    metrics: Metrics,
) -> Result<Summary, Error>
where
    R: AsyncBufRead + Unpin,
    G: Gateway,
    S: Sink,
{
    config.validate()?;
    let capacity = NonZeroUsize::new(config.batch_size)
        .ok_or(Error::InvalidConfig("batch size must be at least 1"))?;

    let limiter = Arc::new(Limiter::new(config.rate));
    if limiter.enabled() {
        info!(rate = config.rate, "pacing requests");
    }
    info!(
        endpoint = config.endpoint(),
        batch_size = config.batch_size,
        workers = config.workers,
        "dispatching"
    );
    let sender = Sender::new(config.clone(), gateway, limiter, metrics.clone());
    let dispatcher = Dispatcher::start(config.workers, sender, sink, metrics);

    let mut batcher = Batcher::new(input, capacity);
    let mut composer = Composer::new(config);
    let mut sent = 0;
    let mut failure = None;
    loop {
        let batch = match batcher.next_batch().await {
            Ok(Some(batch)) => batch,
            Ok(None) => break,
            Err(err) => {
                error!(?err, "unable to read input");
                failure = Some(err);
                break;
            }
        };
        sent += batch.len();
        dispatcher.submit(composer.compose(batch)).await?;
        info!(sent, "submitted batch");
    }
    info!(sent, "finished reading input");

    let summary = dispatcher.shutdown().await;
    info!(
        submitted = summary.submitted,
        completed = summary.completed,
        "dispatch complete"
    );
    if let Some(err) = failure {
        return Err(Error::Input(err));
    }
    if summary.completed != summary.submitted {
        return Err(Error::Incomplete {
            submitted: summary.submitted,
            completed: summary.completed,
        });
    }
    Ok(summary)
}
