//! Dispatch signed batches of phones to a bulk messaging gateway.
//!
//! # Overview
//!
//! Phones are read line by line from an input stream and grouped by a [batcher::Batcher]
//! into fixed-size batches. Each batch is combined with the campaign [config::Config] by a
//! [composer::Composer], which renders the message text, computes the request signature
//! ([signer]) and, when delivery reports are requested, assigns a fresh transaction id.
//!
//! The resulting [job::Job]s are handed to a [dispatcher::Dispatcher]: a fixed pool of
//! workers sharing one shallow queue. A worker executes one job at a time through the
//! [sender::Sender], which (optionally) waits on a shared [limiter::Limiter], submits the
//! batch through a [gateway::Gateway], and classifies the response into one
//! [outcome::Outcome] per phone. Outcomes are written to a [outcome::Sink].
//!
//! Shutdown is two-phase: the driving loop first waits until every submitted job has
//! completed and only then tells each worker to stop and joins them all. No job that was
//! accepted by [dispatcher::Dispatcher::submit] is ever dropped.
//!
//! # Failures
//!
//! Setup can fail the process (configuration, image upload). Once dispatch has started,
//! transport failures, gateway rejections, and unparseable responses are all recorded as
//! outcomes and the pipeline carries on. A failure to read the input stops reading, and a
//! dispatch where some job never completed is reported as an error once every worker stopped.

use std::path::PathBuf;
use thiserror::Error;

pub mod batcher;
pub mod composer;
pub mod config;
pub mod dispatcher;
pub mod gateway;
pub mod job;
pub mod limiter;
pub mod metrics;
pub mod outcome;
pub mod pipeline;
pub mod segments;
pub mod sender;
pub mod signer;
pub mod template;
pub mod upload;

#[cfg(test)]
pub(crate) mod mocks;

/// Errors that can occur while setting up or driving a dispatch.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("unable to read config {0}: {1}")]
    ConfigRead(PathBuf, std::io::Error),
    #[error("unable to parse config: {0}")]
    ConfigParse(#[from] serde_yaml::Error),
    #[error("unable to read image {0}: {1}")]
    ImageRead(PathBuf, std::io::Error),
    #[error("image upload failed: {0}")]
    UploadFailed(#[from] reqwest::Error),
    #[error("malformed upload response: {0}")]
    UploadMalformed(#[from] serde_json::Error),
    #[error("image upload rejected (status={status}): {error}")]
    UploadRejected { status: i64, error: String },
    #[error("text needs {actual} segments, expected {expected}")]
    SegmentMismatch { expected: usize, actual: usize },
    #[error("unable to read input: {0}")]
    Input(#[from] std::io::Error),
    #[error("completed {completed} of {submitted} jobs")]
    Incomplete { submitted: u64, completed: u64 },
    #[error("dispatcher closed")]
    Closed,
}
