//! HTTP plumbing shared by the site adapters.

use std::time::Duration;

use exn::ResultExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::debug;
use url::Url;

use crate::error::{ErrorKind, Result};
use crate::models::{Payload, SourceId};
use crate::read::read_bounded;

/// Parse a configured base URL. The result always ends in `/` so relative
/// endpoints join under it.
pub(super) fn base_url(base_url: &str) -> Result<Url> {
    let mut base = Url::parse(base_url).or_raise(|| ErrorKind::InvalidConfig(format!("base url: {base_url}")))?;
    if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
        exn::bail!(ErrorKind::InvalidConfig(format!("base url: {base_url}")));
    }
    if !base.path().ends_with('/') {
        base.set_path(&format!("{}/", base.path()));
    }
    Ok(base)
}

pub(super) fn client(user_agent: &str, request_timeout: Duration, connect_timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(request_timeout)
        .connect_timeout(connect_timeout)
        .build()
        .or_raise(|| ErrorKind::InvalidConfig("http client".to_string()))
}

pub(super) async fn send(request: RequestBuilder) -> Result<Response> {
    match request.send().await {
        Ok(response) => Ok(response),
        Err(error) => {
            let kind = ErrorKind::from_reqwest(&error);
            Err(exn::Exn::new(error).raise(kind))
        },
    }
}

/// Read a successful response body, bounded by `ceiling`.
pub(super) async fn read(source: &SourceId, response: Response, ceiling: usize) -> Result<Payload> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        exn::bail!(ErrorKind::NotFound(response.url().to_string()));
    }
    if !status.is_success() {
        exn::bail!(ErrorKind::Status(status.as_u16()));
    }
    let declared_length = response.content_length();
    let mut payload = read_bounded(response.bytes_stream(), ceiling).await?;
    payload.declared_length = declared_length;
    if payload.truncated {
        debug!(%source, declared_length, ceiling, "payload truncated");
    }
    Ok(payload)
}
