//! Built-in fallback transport for the common schemes.
//!
//! Handles bare paths and `file`, `http`/`https`, `ftp`, and the object
//! stores `s3`, `gs` and `az`. Downloads are written to a hidden sibling of
//! the destination and renamed into place once complete.

mod ftp;
mod http;
mod local;
mod object;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::progress::TransferProgress;
use crate::target::Target;
use crate::transport::Transport;

pub const GENERIC_SCHEMES: &[&str] = &["file", "http", "https", "ftp", "s3", "gs", "az"];

const COPY_BUFFER_SIZE: usize = 100 * 1024;

#[derive(Debug, Clone)]
pub struct GenericTransport {
    client: reqwest::Client,
    show_progress: bool,
}

impl GenericTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            show_progress: true,
        }
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn supports(scheme: &str) -> bool {
        GENERIC_SCHEMES
            .iter()
            .any(|s| s.eq_ignore_ascii_case(scheme))
    }

    /// Create an empty directory at a remote location. Object stores have
    /// no directories, so this is a no-op for them.
    pub async fn create_folder(&self, destination: &str) -> Result<()> {
        match Target::parse(destination)? {
            Target::Local(path) => local::create_folder(&path).await,
            Target::Remote(url) => match url.scheme() {
                "file" => local::create_folder(&local::url_to_path(&url)?).await,
                "ftp" => ftp::create_folder(&url).await,
                _ => Ok(()),
            },
        }
    }

    fn progress(&self, len: Option<u64>, label: &Path) -> TransferProgress {
        let label = label
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        TransferProgress::new(len, label, self.show_progress)
    }
}

impl Default for GenericTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for GenericTransport {
    fn name(&self) -> &str {
        "generic"
    }

    fn schemes_handled(&self) -> BTreeSet<String> {
        GENERIC_SCHEMES.iter().map(|s| s.to_string()).collect()
    }

    async fn download_from(&self, source: &str, destination: &Path) -> Result<()> {
        provision_fs::ensure_parent(destination)?;
        match Target::parse(source)? {
            Target::Local(path) => local::download(self, &path, destination).await,
            Target::Remote(url) => match url.scheme() {
                "file" => local::download(self, &local::url_to_path(&url)?, destination).await,
                "http" | "https" => http::download(self, &url, destination).await,
                "ftp" => ftp::download(self, &url, destination).await,
                "s3" | "gs" | "az" => object::download(self, &url, destination).await,
                other => Err(unsupported(other, source)),
            },
        }
    }

    async fn upload_to(
        &self,
        destination: &str,
        source: &Path,
        metadata: Option<&str>,
    ) -> Result<()> {
        if metadata.is_some() {
            debug!(destination, "generic transport ignores upload metadata");
        }
        match Target::parse(destination)? {
            Target::Local(path) => local::upload(self, source, &path).await,
            Target::Remote(url) => match url.scheme() {
                "file" => local::upload(self, source, &local::url_to_path(&url)?).await,
                "http" | "https" => http::upload(self, source, &url).await,
                "ftp" => ftp::upload(source, &url).await,
                "s3" | "gs" | "az" => object::upload(source, &url).await,
                other => Err(unsupported(other, destination)),
            },
        }
    }
}

fn unsupported(scheme: &str, target: &str) -> TransportError {
    TransportError::UnsupportedScheme {
        scheme: scheme.to_string(),
        target: target.to_string(),
    }
}

/// Hidden sibling a download is written to before it is renamed into place.
pub(crate) fn staging_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{name}.part"))
}

pub(crate) async fn commit(staging: &Path, destination: &Path) -> Result<()> {
    tokio::fs::rename(staging, destination)
        .await
        .map_err(|e| TransportError::io(destination, e))
}

async fn discard(staging: &Path) {
    if let Err(e) = tokio::fs::remove_file(staging).await {
        debug!(path = %staging.display(), error = %e, "could not remove partial download");
    }
}

/// Write a byte stream to `destination` through its staging file.
pub(crate) async fn sink_stream<S, E, M>(
    stream: S,
    destination: &Path,
    progress: &TransferProgress,
    map_err: M,
) -> Result<u64>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    M: Fn(E) -> TransportError,
{
    let staging = staging_path(destination);
    let written = async {
        let mut file = tokio::fs::File::create(&staging)
            .await
            .map_err(|e| TransportError::io(&staging, e))?;
        let mut stream = std::pin::pin!(stream);
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(&map_err)?;
            file.write_all(&chunk)
                .await
                .map_err(|e| TransportError::io(&staging, e))?;
            progress.step(chunk.len() as u64);
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| TransportError::io(&staging, e))?;
        Ok::<_, TransportError>(written)
    }
    .await;

    match written {
        Ok(written) => {
            commit(&staging, destination).await?;
            Ok(written)
        }
        Err(e) => {
            discard(&staging).await;
            Err(e)
        }
    }
}

/// Copy everything `reader` yields to `destination` through its staging file.
pub(crate) async fn sink_reader<R>(
    mut reader: R,
    source: &Path,
    destination: &Path,
    progress: &TransferProgress,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let staging = staging_path(destination);
    let written = async {
        let mut file = tokio::fs::File::create(&staging)
            .await
            .map_err(|e| TransportError::io(&staging, e))?;
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut written = 0u64;
        loop {
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| TransportError::io(source, e))?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])
                .await
                .map_err(|e| TransportError::io(&staging, e))?;
            progress.step(n as u64);
            written += n as u64;
        }
        file.flush()
            .await
            .map_err(|e| TransportError::io(&staging, e))?;
        Ok::<_, TransportError>(written)
    }
    .await;

    match written {
        Ok(written) => {
            commit(&staging, destination).await?;
            Ok(written)
        }
        Err(e) => {
            discard(&staging).await;
            Err(e)
        }
    }
}
