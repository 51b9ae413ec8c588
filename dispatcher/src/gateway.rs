//! Submit requests to the remote gateway and decode its replies.

use crate::job::Form;
use serde::Deserialize;
use std::future::Future;
use thiserror::Error;

/// Message the gateway returns for an accepted request.
pub const OK: &str = "OK";

/// A request that never produced a response body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self(err.to_string())
    }
}

/// Submits forms to the gateway.
pub trait Gateway: Clone + Send + Sync + 'static {
    /// Post `form` to `url`, returning the response body.
    fn submit(
        &self,
        url: &str,
        form: Form,
    ) -> impl Future<Output = Result<String, TransportError>> + Send;
}

/// [Gateway] speaking HTTP.
#[derive(Clone, Default)]
pub struct Http {
    client: reqwest::Client,
}

impl Http {
    /// Create a new [Http] gateway using `client`.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Gateway for Http {
    async fn submit(&self, url: &str, form: Form) -> Result<String, TransportError> {
        let response = self.client.post(url).form(&form).send().await?;
        Ok(response.text().await?)
    }
}

/// Reply to a bulk submission.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BulkReply {
    pub code: i64,
    pub tech_message: String,
    #[serde(default)]
    pub msg_id: String,
}

impl BulkReply {
    /// Decode a reply from `body`.
    pub fn parse(body: &str) -> Result<Self, quick_xml::DeError> {
        quick_xml::de::from_str(body)
    }

    /// Returns true if the gateway accepted the batch.
    pub fn accepted(&self) -> bool {
        self.code == 0 && self.tech_message == OK
    }
}

/// Carrier and location metadata of a single phone.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PhoneInfo {
    #[serde(rename = "cn", default)]
    pub country: String,
    #[serde(rename = "op", default)]
    pub operator: String,
    #[serde(rename = "op_name", default)]
    pub operator_name: String,
    #[serde(default)]
    pub mccmnc: String,
    #[serde(rename = "n_phone", default)]
    pub phone: String,
    #[serde(rename = "loc", default)]
    pub location: String,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
struct Phones {
    #[serde(rename = "phone", default)]
    entries: Vec<PhoneInfo>,
}

/// Reply to a lookup submission.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LookupReply {
    pub code: i64,
    pub techmsg: String,
    #[serde(default)]
    phones: Phones,
}

impl LookupReply {
    /// Decode a reply from `body`.
    pub fn parse(body: &str) -> Result<Self, quick_xml::DeError> {
        quick_xml::de::from_str(body)
    }

    /// Returns true if the gateway answered the lookup.
    pub fn accepted(&self) -> bool {
        self.code == 0 && self.techmsg == OK
    }

    /// Returns the phone entries in reply order.
    pub fn phones(&self) -> &[PhoneInfo] {
        &self.phones.entries
    }
}
