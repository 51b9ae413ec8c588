//! In-memory doubles for the [Gateway] and [Sink] seams and for a failing input.

use crate::{
    gateway::{Gateway, TransportError},
    job::{Form, PHONE},
    outcome::{Outcome, Sink},
};
use std::{
    io,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
    time::Duration,
};
use tokio::io::{AsyncRead, ReadBuf};

/// Builds the reply to a submitted form.
pub type Responder = dyn Fn(&str, &Form) -> Result<String, TransportError> + Send + Sync;

/// [Gateway] answering every request with a fixed closure and remembering what it saw.
#[derive(Clone)]
pub struct Remote {
    responder: Arc<Responder>,
    delay: Duration,
    requests: Arc<Mutex<Vec<(String, Form)>>>,
}

impl Remote {
    /// Create a new mock answering with `responder`.
    pub fn new(
        responder: impl Fn(&str, &Form) -> Result<String, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Arc::new(responder),
            delay: Duration::ZERO,
            requests: Arc::default(),
        }
    }

    /// Create a new mock that always answers with `body`.
    pub fn replying(body: &'static str) -> Self {
        Self::new(move |_, _| Ok(body.to_string()))
    }

    /// Create a new mock that always fails with `err`.
    pub fn failing(err: &'static str) -> Self {
        Self::new(move |_, _| Err(TransportError(err.to_string())))
    }

    /// Wait `delay` before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Returns every request received so far.
    pub fn requests(&self) -> Vec<(String, Form)> {
        self.requests.lock().unwrap().clone()
    }

    /// Returns every phone received so far, in arrival order.
    pub fn phones(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .flat_map(|(_, form)| form.into_iter())
            .filter(|(key, _)| *key == PHONE)
            .map(|(_, value)| value)
            .collect()
    }
}

impl Gateway for Remote {
    async fn submit(&self, url: &str, form: Form) -> Result<String, TransportError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let reply = (self.responder)(url, &form);
        self.requests.lock().unwrap().push((url.to_string(), form));
        reply
    }
}

/// [Sink] collecting outcomes in memory.
#[derive(Clone, Default)]
pub struct Collector {
    outcomes: Arc<Mutex<Vec<Outcome>>>,
}

impl Collector {
    /// Returns every outcome recorded so far.
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.lock().unwrap().clone()
    }
}

impl Sink for Collector {
    async fn record(&mut self, outcomes: Vec<Outcome>) {
        self.outcomes.lock().unwrap().extend(outcomes);
    }
}

/// Input yielding `data` and then failing.
pub struct Failing {
    data: Option<&'static [u8]>,
}

impl Failing {
    /// Create a new reader failing after `data`.
    pub fn after(data: &'static [u8]) -> Self {
        Self { data: Some(data) }
    }
}

impl AsyncRead for Failing {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.data.take() {
            Some(data) => {
                buf.put_slice(data);
                Poll::Ready(Ok(()))
            }
            None => Poll::Ready(Err(io::Error::other("broken pipe"))),
        }
    }
}
