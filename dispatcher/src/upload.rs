//! Upload a campaign image before dispatch starts.

use crate::{signer, Error};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Form field carrying the image content.
const IMAGE_FIELD: &str = "image";

/// Reply of the media endpoint.
#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct Reply {
    image_id: String,
    status: i64,
    error: String,
}

/// Decode the media endpoint's reply, returning the assigned image id.
fn interpret(body: &str) -> Result<String, Error> {
    let reply: Reply = serde_json::from_str(body)?;
    if reply.status == 0 && !reply.image_id.is_empty() {
        return Ok(reply.image_id);
    }
    Err(Error::UploadRejected {
        status: reply.status,
        error: reply.error,
    })
}

/// Upload the image at `path` to `url`, returning its id.
pub async fn upload(
    client: &reqwest::Client,
    url: &str,
    user: &str,
    secret: &str,
    path: &Path,
) -> Result<String, Error> {
    let content = tokio::fs::read(path)
        .await
        .map_err(|e| Error::ImageRead(path.to_path_buf(), e))?;
    let sign = signer::upload(user, &content, secret);
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    info!(?path, bytes = content.len(), "uploading image");

    let form = Form::new()
        .part(IMAGE_FIELD, Part::bytes(content).file_name(file_name))
        .text("sign", sign)
        .text("login", user.to_string());
    let body = client
        .post(url)
        .multipart(form)
        .send()
        .await?
        .text()
        .await?;
    let image_id = interpret(&body)?;
    info!(image_id = image_id.as_str(), "uploaded image");
    Ok(image_id)
}
