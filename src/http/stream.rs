//! Ranged chunk streams over HTTP.

use crate::error::TransportError;
use crate::remote::ByteStream;

use futures::StreamExt;
use reqwest::header::RANGE;
use reqwest::Url;
use reqwest_middleware::ClientWithMiddleware;
use tracing::debug;

/// Opens a chunk stream over `url` starting at byte `start`.
///
/// Returns the stream and the total length of the resource, when the
/// response reveals it (from `Content-Range` for ranged requests, otherwise
/// from `Content-Length` plus the offset). Non-success statuses become
/// [`TransportError::Status`] so the engine can decide whether to retry.
pub async fn open_byte_stream(
    client: &ClientWithMiddleware,
    url: Url,
    start: u64,
) -> Result<(ByteStream, Option<u64>), TransportError> {
    debug!(%url, start, "opening byte stream");
    let mut req = client.get(url);
    if start > 0 {
        req = req.header(RANGE, format!("bytes={start}-"));
    }
    let res = req.send().await.map_err(TransportError::from)?;
    let status = res.status();
    if !status.is_success() {
        return Err(TransportError::Status {
            code: status.as_u16(),
            message: status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_owned(),
        });
    }

    let total = total_length(&res, start);
    let stream = res
        .bytes_stream()
        .map(|item| item.map_err(TransportError::from))
        .boxed();
    Ok((stream, total))
}

/// Parse a `Content-Range` header value (`bytes start-end/total`) into the
/// total size.
pub fn parse_content_range_total(content_range: &str) -> Option<u64> {
    content_range
        .split('/')
        .next_back()
        .and_then(|size| size.trim().parse::<u64>().ok())
}

fn total_length(res: &reqwest::Response, start: u64) -> Option<u64> {
    if let Some(range) = res.headers().get("Content-Range") {
        return range.to_str().ok().and_then(parse_content_range_total);
    }
    res.content_length().map(|len| len + start)
}
