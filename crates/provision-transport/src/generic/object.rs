//! Object store transfers for `s3`, `gs` and `az` URLs. Credentials and
//! regions come from the usual environment variables of each provider.

use std::path::Path;
use std::sync::Arc;

use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::buffered::BufWriter;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path as ObjectPath;
use tokio::io::AsyncWriteExt;
use url::Url;

use super::{GenericTransport, sink_stream, unsupported};
use crate::error::{Result, TransportError};

fn store_error(url: &Url) -> impl Fn(object_store::Error) -> TransportError + Copy + '_ {
    move |source| TransportError::ObjectStore {
        url: url.to_string(),
        source,
    }
}

fn open(url: &Url) -> Result<(Arc<dyn ObjectStore>, ObjectPath)> {
    let err = store_error(url);
    let store: Arc<dyn ObjectStore> = match url.scheme() {
        "s3" => Arc::new(
            AmazonS3Builder::from_env()
                .with_url(url.as_str())
                .build()
                .map_err(err)?,
        ),
        "gs" => Arc::new(
            GoogleCloudStorageBuilder::from_env()
                .with_url(url.as_str())
                .build()
                .map_err(err)?,
        ),
        "az" => Arc::new(
            MicrosoftAzureBuilder::from_env()
                .with_url(url.as_str())
                .build()
                .map_err(err)?,
        ),
        other => return Err(unsupported(other, url.as_str())),
    };
    let path = ObjectPath::from_url_path(url.path()).map_err(|e| err(e.into()))?;
    Ok((store, path))
}

pub(super) async fn download(
    transport: &GenericTransport,
    url: &Url,
    destination: &Path,
) -> Result<()> {
    let err = store_error(url);
    let (store, path) = open(url)?;
    let result = store.get(&path).await.map_err(err)?;

    let progress = transport.progress(Some(result.meta.size as u64), destination);
    sink_stream(result.into_stream(), destination, &progress, err).await?;
    progress.finish();
    Ok(())
}

pub(super) async fn upload(source: &Path, url: &Url) -> Result<()> {
    let (store, path) = open(url)?;
    let mut file = tokio::fs::File::open(source)
        .await
        .map_err(|e| TransportError::io(source, e))?;

    let mut writer = BufWriter::new(store, path);
    let written = match tokio::io::copy(&mut file, &mut writer).await {
        Ok(_) => writer.shutdown().await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        let _ = writer.abort().await;
        return Err(TransportError::io(source, e));
    }
    Ok(())
}
