//! Per-phone results of a dispatch.

use crate::{config::Mode, gateway::PhoneInfo};
use chrono::{DateTime, SecondsFormat, Utc};
use std::{
    fmt,
    future::Future,
    io::{self, Write},
    time::Duration,
};

/// How the attempt for a single phone ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    /// The gateway accepted the message.
    Delivered {
        code: i64,
        message: String,
        message_id: String,
    },
    /// The gateway parsed the request but refused it.
    Rejected {
        code: i64,
        message: String,
        message_id: String,
    },
    /// No response was received.
    Transport(String),
    /// A message response was received but could not be decoded.
    Unparsed(String),
    /// The gateway returned metadata for the phone.
    Found {
        code: i64,
        message: String,
        info: PhoneInfo,
    },
    /// The gateway answered the lookup without metadata for the phone.
    NotFound { code: i64, message: String },
    /// A lookup response was received but could not be decoded.
    LookupFailed,
}

impl Status {
    /// Returns the metric class of the status.
    pub fn class(&self) -> Class {
        match self {
            Self::Delivered { .. } | Self::Found { .. } => Class::Delivered,
            Self::Rejected { .. } | Self::NotFound { .. } => Class::Rejected,
            Self::Transport(_) => Class::Transport,
            Self::Unparsed(_) | Self::LookupFailed => Class::Unparsed,
        }
    }
}

/// Coarse classification of a [Status].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Class {
    Delivered,
    Rejected,
    Transport,
    Unparsed,
}

/// The result of attempting to dispatch to a single phone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub mode: Mode,
    pub phone: String,
    pub transaction_id: String,
    pub requested: DateTime<Utc>,
    pub responded: DateTime<Utc>,
    pub latency: Duration,
    pub status: Status,
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Outcome {
    /// Write the phone, transaction id, and timing columns.
    fn timing(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{};{};{};{:?}",
            self.phone,
            self.transaction_id,
            timestamp(&self.requested),
            timestamp(&self.responded),
            self.latency
        )
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            Status::Delivered {
                code,
                message,
                message_id,
            }
            | Status::Rejected {
                code,
                message,
                message_id,
            } => {
                self.timing(f)?;
                write!(f, ";{message_id};{code};{message}")
            }
            Status::Transport(err) => match self.mode {
                Mode::Message => {
                    self.timing(f)?;
                    write!(f, ";error: {err}")
                }
                Mode::Lookup => write!(f, "{};error: {err}", self.phone),
            },
            Status::Unparsed(body) => {
                self.timing(f)?;
                let body = body.replace(|c: char| matches!(c, '\r' | '\n'), " ");
                write!(f, ";{body}")
            }
            Status::Found {
                code,
                message,
                info,
            } => {
                let phone = if info.phone.is_empty() {
                    &self.phone
                } else {
                    &info.phone
                };
                write!(
                    f,
                    "{phone};{code};{message};{};{};{};{};{}",
                    info.country, info.operator, info.operator_name, info.mccmnc, info.location
                )
            }
            Status::NotFound { code, message } => write!(f, "{};{code};{message}", self.phone),
            Status::LookupFailed => write!(f, "{};ERROR", self.phone),
        }
    }
}

/// Receives the outcomes of each completed job.
pub trait Sink: Clone + Send + 'static {
    /// Record the outcomes of one job, in batch order.
    fn record(&mut self, outcomes: Vec<Outcome>) -> impl Future<Output = ()> + Send;
}

/// [Sink] writing one line per outcome to standard output.
///
/// The lines of a job are written under a single lock, on the blocking pool, so they are
/// never interleaved with the lines of another job.
#[derive(Clone, Default)]
pub struct Stdout;

impl Stdout {
    fn write<W: Write>(out: &mut W, outcomes: &[Outcome]) -> io::Result<()> {
        for outcome in outcomes {
            writeln!(out, "{outcome}")?;
        }
        out.flush()
    }
}

impl Sink for Stdout {
    async fn record(&mut self, outcomes: Vec<Outcome>) {
        let count = outcomes.len();
        let result =
            tokio::task::spawn_blocking(move || Self::write(&mut io::stdout().lock(), &outcomes))
                .await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!(?err, outcomes = count, "failed to write outcomes"),
            Err(err) => tracing::error!(?err, outcomes = count, "outcome writer failed"),
        }
    }
}
