//! Turn batches into signed jobs.

use crate::{
    batcher::Batch,
    config::{Config, Mode},
    job::{Form, Job},
    signer,
    template::Templates,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;
use uuid::Uuid;

/// Combines batches with the campaign [Config] into [Job]s.
pub struct Composer<R = StdRng> {
    config: Arc<Config>,
    templates: Templates,
    rng: R,
}

impl Composer {
    /// Create a new [Composer] seeded from the operating system.
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }
}

impl<R: Rng> Composer<R> {
    /// Create a new [Composer] drawing template randomness from `rng`.
    pub fn with_rng(config: Arc<Config>, rng: R) -> Self {
        let templates = Templates::new(config.texts.clone());
        Self {
            config,
            templates,
            rng,
        }
    }

    /// Build the [Job] for `phones`.
    pub fn compose(&mut self, phones: Batch) -> Job {
        match self.config.mode {
            Mode::Message => self.message(phones),
            Mode::Lookup => self.lookup(phones),
        }
    }

    fn message(&mut self, phones: Batch) -> Job {
        let config = &self.config;
        let text = self.templates.render(&mut self.rng);
        let signature = signer::message(&config.user, &config.from, &phones, &text, &config.pass);

        let mut fields: Form = vec![
            ("user", config.user.clone()),
            ("from", config.from.clone()),
            ("txt", text),
        ];
        for (key, value) in [
            ("sending_method", &config.sending_method),
            ("button_text", &config.button_text),
            ("expiry_txt", &config.expiry_txt),
            ("label", &config.label),
            ("button_link", &config.button_link),
            ("image_id", &config.image_id),
            ("group_id", &config.group_id),
        ] {
            if !value.is_empty() {
                fields.push((key, value.clone()));
            }
        }
        if config.dlr_timeout != 0 {
            fields.push(("dlr_timeout", config.dlr_timeout.to_string()));
        }
        let transaction_id = config.dlr.then(|| Uuid::new_v4().to_string());
        if config.dlr {
            fields.push(("dlr", "1".to_string()));
        }

        Job {
            mode: Mode::Message,
            phones,
            signature,
            fields,
            transaction_id,
        }
    }

    fn lookup(&mut self, phones: Batch) -> Job {
        let config = &self.config;
        let signature = signer::lookup(&config.user, &phones, &config.pass);
        Job {
            mode: Mode::Lookup,
            phones,
            signature,
            fields: vec![
                ("action", signer::LOOKUP_ACTION.to_string()),
                ("username", config.user.clone()),
            ],
            transaction_id: None,
        }
    }
}
