//! Units of work handed to the worker pool.

use crate::{batcher::Batch, config::Mode};

/// Ordered form fields of a request. Keys may repeat.
pub type Form = Vec<(&'static str, String)>;

/// Form field carrying the request signature.
pub const SIGN: &str = "sign";

/// Form field repeated once per phone.
pub const PHONE: &str = "phone";

/// Form field carrying the delivery report transaction id.
pub const TRANSACTION_ID: &str = "p_transaction_id";

/// An immutable, signed batch ready for submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Job {
    pub mode: Mode,
    pub phones: Batch,
    pub signature: String,

    /// Campaign fields in wire order, without the signature or phones.
    pub fields: Form,

    /// Identifier correlating delivery reports, present only when they are requested.
    pub transaction_id: Option<String>,
}

impl Job {
    /// Build the wire form of the job.
    ///
    /// Campaign fields come first, followed by the transaction id (if any), the signature, and
    /// one `phone` field per phone in batch order.
    pub fn form(&self) -> Form {
        let mut form = Form::with_capacity(self.fields.len() + self.phones.len() + 2);
        form.extend(self.fields.iter().cloned());
        if let Some(transaction_id) = &self.transaction_id {
            form.push((TRANSACTION_ID, transaction_id.clone()));
        }
        form.push((SIGN, self.signature.clone()));
        form.extend(self.phones.iter().map(|phone| (PHONE, phone.clone())));
        form
    }

    /// Returns the transaction id or an empty string.
    pub fn transaction_id(&self) -> &str {
        self.transaction_id.as_deref().unwrap_or_default()
    }
}
