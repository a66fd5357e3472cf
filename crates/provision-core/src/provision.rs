//! Batch orchestration of downloads and uploads.
//!
//! Downloads consult the content cache, then dispatch, retry and populate the
//! cache; bare local paths are staged by hard link or copy instead. Uploads
//! are grouped per transport so each group sees exactly one
//! `prepare_file_set` before its transfers and one `finalize_file_set` after.
//! Both directions run on a bounded pool of tokio tasks and fail the batch
//! with the first error once every task has finished.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use provision_fs::walk_tree;
use provision_transport::{FileSet, RetryPolicy, Target, Transport, join_remote};
use tracing::{debug, error, info, warn};

use crate::cache::ContentCache;
use crate::config::{DEFAULT_EXCLUDES, DEFAULT_THREADS, ProvisionConfig};
use crate::dispatch::{Dispatcher, Route};
use crate::error::{ProvisionError, Result};
use crate::pool::{first_error, run_bounded};
use crate::request::{Direction, ErrorKind, ProvisionReport, TransferOutcome, TransferRequest};
use crate::stage::Stager;

#[derive(Debug)]
pub struct ProvisionerBuilder {
    dispatcher: Dispatcher,
    cache: Option<ContentCache>,
    retry: RetryPolicy,
    threads: usize,
    working_dir: PathBuf,
    excludes: Vec<OsString>,
    strict: bool,
}

impl ProvisionerBuilder {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            cache: None,
            retry: RetryPolicy::default(),
            threads: DEFAULT_THREADS,
            working_dir: PathBuf::from("."),
            excludes: DEFAULT_EXCLUDES.iter().map(OsString::from).collect(),
            strict: false,
        }
    }

    /// Threads, retries, cache and exclusions from `config`.
    pub fn from_config(config: &ProvisionConfig, dispatcher: Dispatcher) -> Self {
        let builder = Self::new(dispatcher)
            .threads(config.get_threads())
            .retry(config.retry_policy())
            .excludes(config.exclude_names());
        if config.get_use_cache() {
            builder.cache(ContentCache::new(config.get_cache_dir()))
        } else {
            builder
        }
    }

    pub fn cache(mut self, cache: ContentCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Base for relative local paths and bare-path sources.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn excludes(mut self, excludes: Vec<OsString>) -> Self {
        self.excludes = excludes;
        self
    }

    /// Abort the batch when a local input cannot be staged.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn build(self) -> Provisioner {
        Provisioner {
            inner: Arc::new(Inner {
                stager: Stager::new(self.working_dir, self.excludes.clone()),
                dispatcher: self.dispatcher,
                cache: self.cache,
                retry: self.retry,
                threads: self.threads,
                excludes: self.excludes,
                strict: self.strict,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Provisioner {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    dispatcher: Dispatcher,
    cache: Option<ContentCache>,
    retry: RetryPolicy,
    threads: usize,
    stager: Stager,
    excludes: Vec<OsString>,
    strict: bool,
}

/// An upload with its destination worked out.
#[derive(Debug)]
struct PlannedUpload {
    request: TransferRequest,
    local: PathBuf,
    destination: String,
}

impl Provisioner {
    pub fn builder(dispatcher: Dispatcher) -> ProvisionerBuilder {
        ProvisionerBuilder::new(dispatcher)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Bring every remote input to its local path.
    pub async fn download(&self, requests: Vec<TransferRequest>) -> Result<ProvisionReport> {
        info!(count = requests.len(), threads = self.inner.threads, "provisioning inputs");
        let jobs: Vec<_> = requests
            .into_iter()
            .map(|request| Arc::clone(&self.inner).download_one(request))
            .collect();
        let outcomes = collect_outcomes(run_bounded(self.inner.threads, jobs).await)?;
        Ok(ProvisionReport::new(outcomes))
    }

    /// Send every local output to its remote location.
    pub async fn upload(&self, requests: Vec<TransferRequest>) -> Result<ProvisionReport> {
        let mut groups: Vec<(Route, Vec<TransferRequest>)> = Vec::new();
        for request in requests {
            let route = self.inner.dispatcher.resolve(&request.remote_path)?;
            match groups.iter_mut().find(|(r, _)| *r == route) {
                Some((_, members)) => members.push(request),
                None => groups.push((route, vec![request])),
            }
        }

        let mut report = ProvisionReport::default();
        for (route, members) in groups {
            report.extend(self.upload_group(route, members).await?);
        }
        Ok(report)
    }

    /// Downloads first, then uploads.
    pub async fn provision(&self, requests: Vec<TransferRequest>) -> Result<ProvisionReport> {
        let (downloads, uploads): (Vec<_>, Vec<_>) = requests
            .into_iter()
            .partition(|r| r.direction == Direction::Download);

        let mut report = self.download(downloads).await?;
        report.extend(self.upload(uploads).await?);
        Ok(report)
    }

    async fn upload_group(
        &self,
        route: Route,
        members: Vec<TransferRequest>,
    ) -> Result<ProvisionReport> {
        let transport = self.inner.dispatcher.transport(route);
        let planned: Vec<PlannedUpload> = members
            .into_iter()
            .map(|request| {
                let local = self.inner.stager.resolve(&request.local_path);
                let destination = upload_destination(&request, &local);
                PlannedUpload {
                    request,
                    local,
                    destination,
                }
            })
            .collect();

        let mut files = FileSet::new();
        for upload in &planned {
            files.push(
                upload.destination.clone(),
                upload.local.clone(),
                upload.request.metadata.clone(),
            );
        }

        info!(
            transport = %self.inner.dispatcher.name(route),
            files = files.len(),
            "uploading outputs"
        );
        transport.prepare_file_set(&files).await?;

        let jobs: Vec<_> = planned
            .into_iter()
            .map(|upload| Arc::clone(&self.inner).upload_one(route, Arc::clone(&transport), upload))
            .collect();
        let outcomes = collect_outcomes(run_bounded(self.inner.threads, jobs).await)?;

        transport.finalize_file_set(&files).await?;
        Ok(ProvisionReport::new(outcomes))
    }
}

impl Inner {
    async fn download_one(self: Arc<Self>, request: TransferRequest) -> Result<TransferOutcome> {
        let local = self.stager.resolve(&request.local_path);
        let remote = request.remote_path.as_str();

        if let Target::Local(source) = Target::parse(remote)? {
            return self.stage_local(&request, source, local).await;
        }

        let route = self.dispatcher.resolve(remote)?;
        if route == Route::Generic && local.exists() {
            info!(
                id = %request.logical_id,
                local = %local.display(),
                "already provisioned, skipping download"
            );
            return Ok(TransferOutcome::succeeded(&request.logical_id, local, None));
        }
        let transport = self.dispatcher.transport(route);
        let cache = self.cache.as_ref().filter(|_| !request.is_directory);

        let _guard = match cache {
            Some(cache) => Some(cache.lock(remote).await),
            None => None,
        };
        if let Some(cache) = cache {
            if cache.restore(remote, &local)? {
                return Ok(TransferOutcome::succeeded(&request.logical_id, local, None));
            }
        }

        provision_fs::ensure_parent(&local)?;
        info!(
            id = %request.logical_id,
            remote,
            local = %local.display(),
            transport = %self.dispatcher.name(route),
            "downloading"
        );
        self.retry.download(transport.as_ref(), remote, &local).await?;

        if let Some(cache) = cache {
            if let Err(e) = cache.populate(remote, &local) {
                warn!(remote, error = %e, "could not add download to cache");
            }
        }
        Ok(TransferOutcome::succeeded(&request.logical_id, local, None))
    }

    async fn stage_local(
        &self,
        request: &TransferRequest,
        source: PathBuf,
        local: PathBuf,
    ) -> Result<TransferOutcome> {
        if local.exists() {
            info!(
                id = %request.logical_id,
                local = %local.display(),
                "already in place, skipping staging"
            );
            return Ok(TransferOutcome::succeeded(&request.logical_id, local, None));
        }

        let stager = self.stager.clone();
        let destination = local.clone();
        let staged = tokio::task::spawn_blocking(move || stager.stage(&source, &destination))
            .await
            .map_err(|e| ProvisionError::Worker(e.to_string()))?;

        match staged {
            Ok(_) => Ok(TransferOutcome::succeeded(&request.logical_id, local, None)),
            Err(e) if self.strict => Err(e),
            Err(e) => {
                warn!(id = %request.logical_id, error = %e, "local input could not be staged");
                Ok(TransferOutcome::failed(
                    &request.logical_id,
                    local,
                    Some(ErrorKind::TransferFailed),
                ))
            }
        }
    }

    async fn upload_one(
        self: Arc<Self>,
        route: Route,
        transport: Arc<dyn Transport>,
        upload: PlannedUpload,
    ) -> Result<TransferOutcome> {
        let PlannedUpload {
            request,
            local,
            destination,
        } = upload;

        if request.is_directory {
            if let Route::Plugin(_) = route {
                warn!(
                    id = %request.logical_id,
                    plugin = %self.dispatcher.name(route),
                    "plugins do not upload directories, skipping"
                );
                return Ok(TransferOutcome::failed(&request.logical_id, local, None));
            }
            self.upload_tree(&local, &destination, request.metadata.as_deref())
                .await?;
        } else {
            info!(
                id = %request.logical_id,
                local = %local.display(),
                remote = %destination,
                "uploading"
            );
            self.retry
                .upload(
                    transport.as_ref(),
                    &destination,
                    &local,
                    request.metadata.as_deref(),
                )
                .await?;
        }

        Ok(TransferOutcome::succeeded(
            &request.logical_id,
            local,
            Some(destination),
        ))
    }

    /// Mirror a local directory below `destination` with the generic
    /// transport, one leaf at a time.
    async fn upload_tree(
        &self,
        local: &Path,
        destination: &str,
        metadata: Option<&str>,
    ) -> Result<()> {
        let generic = self.dispatcher.generic();
        self.retry
            .run(destination, local, || generic.create_folder(destination))
            .await?;

        let root = local.to_path_buf();
        let excludes = self.excludes.clone();
        let entries = tokio::task::spawn_blocking(move || walk_tree(&root, &excludes))
            .await
            .map_err(|e| ProvisionError::Worker(e.to_string()))??;

        for entry in entries {
            let remote = join_remote(destination, &entry.relative);
            let source = local.join(&entry.relative);
            if entry.is_dir {
                self.retry
                    .run(&remote, &source, || generic.create_folder(&remote))
                    .await?;
            } else {
                debug!(local = %source.display(), %remote, "uploading directory entry");
                self.retry
                    .upload(generic, &remote, &source, metadata)
                    .await?;
            }
        }
        Ok(())
    }
}

/// Directory uploads land under `<remote>/<directory name>`.
fn upload_destination(request: &TransferRequest, local: &Path) -> String {
    if !request.is_directory {
        return request.remote_path.clone();
    }
    match local.file_name() {
        Some(name) => join_remote(&request.remote_path, Path::new(name)),
        None => request.remote_path.clone(),
    }
}

fn collect_outcomes(results: Vec<Result<TransferOutcome>>) -> Result<Vec<TransferOutcome>> {
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        error!(error = %err, kind = ?err.kind(), "transfer failed");
    }
    first_error(results)
}
