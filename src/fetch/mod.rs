mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use reqwest::StatusCode;

use crate::error::RequestError;

/// Sends `req` and returns the status together with the full body.
///
/// Non-success statuses are not errors here; the caller decides how to read
/// the body.
pub async fn fetch_bytes<C: HttpClient>(
    client: &C,
    req: reqwest::Request,
) -> Result<(StatusCode, Vec<u8>), RequestError> {
    let resp = client.execute(req).await?;
    let status = resp.status();
    Ok((status, resp.bytes().await?.to_vec()))
}
