use futures::StreamExt;
use reqwest::Client;

use crate::downloader::range_parser::{RangeBodyParser, RangeRequestResult};
use crate::types::types::DownloadError;

/// Issues a single `Range: bytes=start-end` GET and drives the response
/// through [`RangeBodyParser`] as its body streams in.
///
/// Connection setup, TLS, and redirects are handled entirely by `reqwest`;
/// this function is only responsible for the range semantics layered on top.
pub async fn send_range_request(
    client: &Client,
    url: &str,
    start: u64,
    end: u64,
) -> Result<RangeRequestResult, DownloadError> {
    log::debug!("range request: {url} bytes={start}-{end}");

    let response = client
        .get(url)
        .header("Range", format!("bytes={start}-{end}"))
        .send()
        .await?;

    let status = response.status();
    if status.as_u16() != 200 && status.as_u16() != 206 {
        return Err(DownloadError::BadStatus(status.as_u16()));
    }

    let mut parser = RangeBodyParser::new();
    parser.feed(&synthetic_header(&response, start, end))?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        parser.feed(&chunk)?;
    }

    let result = parser.finish()?;
    log::debug!(
        "range response: offset={} total_len={} received={} complete={}",
        result.offset,
        result.total_len,
        result.buffer.len(),
        result.is_complete
    );
    Ok(result)
}

/// Reconstructs a `Content-Range: ...\r\n\r\n` header block from the response's
/// real headers so it can be fed through the same incremental parser used for
/// the live body stream, rather than special-casing a non-streaming code path.
fn synthetic_header(response: &reqwest::Response, start: u64, end: u64) -> Vec<u8> {
    if let Some(value) = response.headers().get(reqwest::header::CONTENT_RANGE) {
        let mut header = Vec::with_capacity(value.len() + 20);
        header.extend_from_slice(b"Content-Range: ");
        header.extend_from_slice(value.as_bytes());
        header.extend_from_slice(b"\r\n\r\n");
        return header;
    }

    // Server ignored the Range header and returned the whole resource (200).
    let total = response
        .headers()
        .get(reqwest::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(end + 1);
    format!("Content-Range: bytes {start}-{}/{total}\r\n\r\n", total - 1).into_bytes()
}
