use std::path::Path;

use reqwest::header::CONTENT_LENGTH;
use url::Url;

use super::{GenericTransport, sink_stream};
use crate::error::{Result, TransportError};

fn request_error(url: &Url) -> impl Fn(reqwest::Error) -> TransportError + '_ {
    move |source| TransportError::Http {
        url: url.to_string(),
        source,
    }
}

fn check_status(url: &Url, response: &reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(TransportError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

pub(super) async fn download(
    transport: &GenericTransport,
    url: &Url,
    destination: &Path,
) -> Result<()> {
    let response = transport
        .client
        .get(url.clone())
        .send()
        .await
        .map_err(request_error(url))?;
    check_status(url, &response)?;

    let progress = transport.progress(response.content_length(), destination);
    sink_stream(
        response.bytes_stream(),
        destination,
        &progress,
        request_error(url),
    )
    .await?;
    progress.finish();
    Ok(())
}

pub(super) async fn upload(transport: &GenericTransport, source: &Path, url: &Url) -> Result<()> {
    let file = tokio::fs::File::open(source)
        .await
        .map_err(|e| TransportError::io(source, e))?;
    let len = file
        .metadata()
        .await
        .map_err(|e| TransportError::io(source, e))?
        .len();

    let response = transport
        .client
        .put(url.clone())
        .header(CONTENT_LENGTH, len)
        .body(reqwest::Body::from(file))
        .send()
        .await
        .map_err(request_error(url))?;
    check_status(url, &response)
}
