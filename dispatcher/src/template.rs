//! Render message texts from a pool of templates.
//!
//! Two placeholders are supported:
//! - `{rnd}`: replaced by 6 random alphanumeric characters.
//! - `{rndnum}`: replaced by 12 random digits.
//!
//! Values are drawn once per render: every occurrence of a placeholder in one text receives
//! the same value.

use rand::{seq::SliceRandom, Rng};

/// Placeholder for a random alphanumeric string.
pub const RANDOM_ALPHANUMERIC: &str = "{rnd}";

/// Placeholder for a random numeric string.
pub const RANDOM_NUMERIC: &str = "{rndnum}";

const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ1234567890";
const NUMERIC: &[u8] = b"1234567890";

const ALPHANUMERIC_LEN: usize = 6;
const NUMERIC_LEN: usize = 12;

/// A pool of message templates.
#[derive(Clone, Debug, Default)]
pub struct Templates {
    templates: Vec<String>,
}

impl Templates {
    /// Create a new pool from `templates`.
    pub fn new(templates: Vec<String>) -> Self {
        Self { templates }
    }

    /// Pick a template uniformly at random and fill in its placeholders.
    ///
    /// Returns an empty string if the pool is empty.
    pub fn render<R: Rng>(&self, rng: &mut R) -> String {
        let Some(template) = self.templates.choose(rng) else {
            return String::new();
        };
        fill(template, rng)
    }
}

fn random<R: Rng>(rng: &mut R, charset: &[u8], len: usize) -> String {
    (0..len)
        .map(|_| charset[rng.gen_range(0..charset.len())] as char)
        .collect()
}

/// Replace every placeholder in `template` with a random value, drawn once per placeholder.
pub fn fill<R: Rng>(template: &str, rng: &mut R) -> String {
    let mut alphanumeric = None;
    let mut numeric = None;
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix(RANDOM_NUMERIC) {
            out.push_str(numeric.get_or_insert_with(|| random(rng, NUMERIC, NUMERIC_LEN)));
            rest = after;
        } else if let Some(after) = tail.strip_prefix(RANDOM_ALPHANUMERIC) {
            out.push_str(
                alphanumeric.get_or_insert_with(|| random(rng, ALPHANUMERIC, ALPHANUMERIC_LEN)),
            );
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}
