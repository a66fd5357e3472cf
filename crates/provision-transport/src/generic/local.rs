use std::path::{Path, PathBuf};

use url::Url;

use super::{GenericTransport, sink_reader};
use crate::error::{Result, TransportError};

pub(super) fn url_to_path(url: &Url) -> Result<PathBuf> {
    url.to_file_path()
        .map_err(|()| TransportError::InvalidTarget {
            target: url.to_string(),
            reason: "not a local file URL".to_string(),
        })
}

pub(super) async fn download(
    transport: &GenericTransport,
    source: &Path,
    destination: &Path,
) -> Result<()> {
    copy_file(transport, source, destination).await
}

pub(super) async fn upload(
    transport: &GenericTransport,
    source: &Path,
    destination: &Path,
) -> Result<()> {
    provision_fs::ensure_parent(destination)?;
    copy_file(transport, source, destination).await
}

pub(super) async fn create_folder(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| TransportError::io(path, e))
}

async fn copy_file(transport: &GenericTransport, source: &Path, destination: &Path) -> Result<()> {
    let file = tokio::fs::File::open(source)
        .await
        .map_err(|e| TransportError::io(source, e))?;
    let len = file
        .metadata()
        .await
        .map_err(|e| TransportError::io(source, e))?
        .len();

    let progress = transport.progress(Some(len), destination);
    sink_reader(file, source, destination, &progress).await?;
    progress.finish();
    Ok(())
}
