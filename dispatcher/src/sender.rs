//! Submit jobs and classify the gateway's replies.

use crate::{
    config::{Config, Mode},
    gateway::{BulkReply, Gateway, LookupReply, TransportError},
    job::Job,
    limiter::Limiter,
    metrics::Metrics,
    outcome::{Outcome, Status},
};
use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Executes [Job]s against a [Gateway].
///
/// Every execution yields exactly one [Outcome] per phone of the job, in batch order,
/// whatever happens to the request.
#[derive(Clone)]
pub struct Sender<G: Gateway> {
    config: Arc<Config>,
    gateway: G,
    limiter: Arc<Limiter>,
    metrics: Metrics,
}

impl<G: Gateway> Sender<G> {
    /// Create a new [Sender].
    ///
    /// `limiter` is shared by every clone, so its rate bounds all workers combined.
    pub fn new(config: Arc<Config>, gateway: G, limiter: Arc<Limiter>, metrics: Metrics) -> Self {
        Self {
            config,
            gateway,
            limiter,
            metrics,
        }
    }

    /// Submit `job` and return the outcome of each of its phones.
    pub async fn execute(&self, job: &Job) -> Vec<Outcome> {
        self.limiter.pace().await;

        let url = match job.mode {
            Mode::Message => &self.config.bulk_url,
            Mode::Lookup => &self.config.lookup_url,
        };
        let requested = Utc::now();
        let start = Instant::now();
        let reply = self.gateway.submit(url, job.form()).await;
        let latency = start.elapsed();
        let responded = Utc::now();

        let statuses = match job.mode {
            Mode::Message => classify_message(job.phones.len(), reply),
            Mode::Lookup => classify_lookup(job.phones.len(), reply),
        };
        debug!(
            phones = job.phones.len(),
            transaction_id = job.transaction_id(),
            ?latency,
            "executed job"
        );

        job.phones
            .iter()
            .zip(statuses)
            .map(|(phone, status)| {
                self.metrics.outcome(status.class());
                Outcome {
                    mode: job.mode,
                    phone: phone.clone(),
                    transaction_id: job.transaction_id().to_string(),
                    requested,
                    responded,
                    latency,
                    status,
                }
            })
            .collect()
    }
}

/// Classify a bulk reply into one [Status] per phone.
fn classify_message(phones: usize, reply: Result<String, TransportError>) -> Vec<Status> {
    let body = match reply {
        Ok(body) => body,
        Err(err) => {
            warn!(%err, phones, "bulk request failed");
            return vec![Status::Transport(err.0); phones];
        }
    };
    let status = match BulkReply::parse(&body) {
        Ok(reply) if reply.accepted() => Status::Delivered {
            code: reply.code,
            message: reply.tech_message,
            message_id: reply.msg_id,
        },
        Ok(reply) => Status::Rejected {
            code: reply.code,
            message: reply.tech_message,
            message_id: reply.msg_id,
        },
        Err(err) => {
            warn!(%err, phones, "unable to decode bulk reply");
            Status::Unparsed(body)
        }
    };
    vec![status; phones]
}

/// Classify a lookup reply into one [Status] per phone.
///
/// Entries of an accepted reply are matched to the requested phones by position.
fn classify_lookup(phones: usize, reply: Result<String, TransportError>) -> Vec<Status> {
    let body = match reply {
        Ok(body) => body,
        Err(err) => {
            warn!(%err, phones, "lookup request failed");
            return vec![Status::Transport(err.0); phones];
        }
    };
    let reply = match LookupReply::parse(&body) {
        Ok(reply) => reply,
        Err(err) => {
            warn!(%err, phones, "unable to decode lookup reply");
            return vec![Status::LookupFailed; phones];
        }
    };
    if !reply.accepted() {
        return vec![
            Status::NotFound {
                code: reply.code,
                message: reply.techmsg,
            };
            phones
        ];
    }

    let entries = reply.phones();
    if entries.len() > phones {
        warn!(
            phones,
            entries = entries.len(),
            "lookup reply has more entries than requested"
        );
    }
    (0..phones)
        .map(|i| match entries.get(i) {
            Some(info) => Status::Found {
                code: reply.code,
                message: reply.techmsg.clone(),
                info: info.clone(),
            },
            None => Status::NotFound {
                code: reply.code,
                message: reply.techmsg.clone(),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{composer::Composer, mocks, outcome::Class};
    use prometheus_client::registry::Registry;
    use tokio::time::Duration;

    const ACCEPTED: &str =
        "<response><code>0</code><tech_message>OK</tech_message><msg_id>X1</msg_id></response>";
    const REJECTED: &str =
        "<response><code>-2</code><tech_message>WRONG_SIGN</tech_message></response>";

    fn config(mode: Mode) -> Arc<Config> {
        Arc::new(Config {
            mode,
            user: "acme".into(),
            pass: "secret".into(),
            from: "ACME".into(),
            texts: vec!["hello".into()],
            bulk_url: "http://bulk.test/".into(),
            lookup_url: "http://lookup.test/".into(),
            ..Default::default()
        })
    }

    fn job(config: &Arc<Config>, phones: &[&str]) -> Job {
        let mut composer = Composer::new(config.clone());
        composer.compose(phones.iter().map(|p| p.to_string()).collect())
    }

    fn setup(config: Arc<Config>, remote: mocks::Remote) -> (Sender<mocks::Remote>, Metrics) {
        let metrics = Metrics::new(&mut Registry::default());
        let sender = Sender::new(config, remote, Arc::new(Limiter::new(0.0)), metrics.clone());
        (sender, metrics)
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let config = config(Mode::Message);
        let (sender, metrics) = setup(config.clone(), mocks::Remote::failing("connection refused"));
        let outcomes = sender.execute(&job(&config, &["A", "B"])).await;

        assert_eq!(outcomes.len(), 2);
        for outcome in &outcomes {
            assert_eq!(outcome.status, Status::Transport("connection refused".into()));
            assert!(outcome.to_string().ends_with(";error: connection refused"));
        }
        assert_eq!(outcomes[0].phone, "A");
        assert_eq!(outcomes[1].phone, "B");
        assert_eq!(metrics.transport.get(), 2);
    }

    #[tokio::test]
    async fn test_accepted() {
        let config = config(Mode::Message);
        let remote = mocks::Remote::replying(ACCEPTED);
        let (sender, metrics) = setup(config.clone(), remote.clone());
        let job = job(&config, &["A", "B"]);
        let outcomes = sender.execute(&job).await;

        assert_eq!(outcomes.len(), 2);
        for (outcome, phone) in outcomes.iter().zip(["A", "B"]) {
            assert_eq!(outcome.phone, phone);
            assert_eq!(
                outcome.status,
                Status::Delivered {
                    code: 0,
                    message: "OK".into(),
                    message_id: "X1".into(),
                }
            );
            assert!(outcome.responded >= outcome.requested);
        }
        assert_eq!(metrics.delivered.get(), 2);

        // The signed form was submitted to the bulk endpoint
        let requests = remote.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "http://bulk.test/");
        assert_eq!(requests[0].1, job.form());
    }

    #[tokio::test]
    async fn test_rejected() {
        let config = config(Mode::Message);
        let (sender, metrics) = setup(config.clone(), mocks::Remote::replying(REJECTED));
        let outcomes = sender.execute(&job(&config, &["A", "B", "C"])).await;

        assert_eq!(outcomes.len(), 3);
        for outcome in &outcomes {
            assert_eq!(
                outcome.status,
                Status::Rejected {
                    code: -2,
                    message: "WRONG_SIGN".into(),
                    message_id: String::new(),
                }
            );
        }
        assert_eq!(metrics.rejected.get(), 3);
    }

    #[tokio::test]
    async fn test_ok_message_with_error_code_is_rejected() {
        let config = config(Mode::Message);
        let body = "<response><code>5</code><tech_message>OK</tech_message><msg_id>X9</msg_id></response>";
        let (sender, metrics) = setup(config.clone(), mocks::Remote::replying(body));
        let outcomes = sender.execute(&job(&config, &["A"])).await;

        assert_eq!(
            outcomes[0].status,
            Status::Rejected {
                code: 5,
                message: "OK".into(),
                message_id: "X9".into(),
            }
        );
        assert_eq!(metrics.delivered.get(), 0);
        assert_eq!(metrics.rejected.get(), 1);
    }

    #[tokio::test]
    async fn test_unparsed_keeps_body() {
        let config = config(Mode::Message);
        let (sender, metrics) = setup(config.clone(), mocks::Remote::replying("502 Bad Gateway"));
        let outcomes = sender.execute(&job(&config, &["A"])).await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, Status::Unparsed("502 Bad Gateway".into()));
        assert_eq!(outcomes[0].status.class(), Class::Unparsed);
        assert_eq!(metrics.unparsed.get(), 1);
    }

    #[tokio::test]
    async fn test_transaction_id_recorded() {
        let config = Arc::new(Config {
            dlr: true,
            ..(*config(Mode::Message)).clone()
        });
        let (sender, _) = setup(config.clone(), mocks::Remote::replying(ACCEPTED));
        let job = job(&config, &["A", "B"]);
        let outcomes = sender.execute(&job).await;
        for outcome in &outcomes {
            assert_eq!(Some(outcome.transaction_id.clone()), job.transaction_id);
        }
    }

    #[tokio::test]
    async fn test_lookup_found() {
        let body = "<response><code>0</code><techmsg>OK</techmsg><phones>\
            <phone><cn>RU</cn><op>mts</op><op_name>MTS</op_name><mccmnc>25001</mccmnc><n_phone>1</n_phone><loc>Moscow</loc></phone>\
            </phones></response>";
        let config = config(Mode::Lookup);
        let remote = mocks::Remote::replying(body);
        let (sender, metrics) = setup(config.clone(), remote.clone());
        let outcomes = sender.execute(&job(&config, &["1", "2"])).await;

        // Every requested phone gets a record, even without a matching entry
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(&outcomes[0].status, Status::Found { info, .. } if info.location == "Moscow"));
        assert_eq!(
            outcomes[1].status,
            Status::NotFound {
                code: 0,
                message: "OK".into()
            }
        );
        assert_eq!(outcomes[0].to_string(), "1;0;OK;RU;mts;MTS;25001;Moscow");
        assert_eq!(metrics.delivered.get(), 1);
        assert_eq!(metrics.rejected.get(), 1);
        assert_eq!(remote.requests()[0].0, "http://lookup.test/");
    }

    #[tokio::test]
    async fn test_lookup_rejected_and_malformed() {
        let config = config(Mode::Lookup);
        let (sender, _) = setup(
            config.clone(),
            mocks::Remote::replying("<r><code>-1</code><techmsg>AUTH_FAILED</techmsg></r>"),
        );
        let outcomes = sender.execute(&job(&config, &["1", "2"])).await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[1].to_string(), "2;-1;AUTH_FAILED");

        let (sender, _) = setup(config.clone(), mocks::Remote::replying("oops"));
        let outcomes = sender.execute(&job(&config, &["1", "2"])).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.status == Status::LookupFailed));
        assert_eq!(outcomes[0].to_string(), "1;ERROR");
    }

    #[tokio::test(start_paused = true)]
    async fn test_paced_by_limiter() {
        let config = config(Mode::Message);
        let metrics = Metrics::new(&mut Registry::default());
        let sender = Sender::new(
            config.clone(),
            mocks::Remote::replying(ACCEPTED),
            Arc::new(Limiter::new(10.0)),
            metrics,
        );
        let job = job(&config, &["A"]);
        let start = Instant::now();
        for _ in 0..3 {
            sender.execute(&job).await;
        }
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_measured() {
        let config = config(Mode::Message);
        let remote = mocks::Remote::replying(ACCEPTED).with_delay(Duration::from_millis(40));
        let (sender, _) = setup(config.clone(), remote);
        let outcomes = sender.execute(&job(&config, &["A"])).await;
        assert!(outcomes[0].latency >= Duration::from_millis(40));
    }
}
