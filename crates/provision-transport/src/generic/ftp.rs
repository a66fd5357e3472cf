//! FTP transfers. The client is synchronous and always runs in passive
//! binary mode on a blocking thread.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Mode};
use tracing::debug;
use url::Url;

use super::{COPY_BUFFER_SIZE, GenericTransport, commit, staging_path};
use crate::error::{Result, TransportError};
use crate::progress::TransferProgress;

const DEFAULT_PORT: u16 = 21;

#[derive(Debug, Clone)]
struct FtpLocation {
    url: String,
    host: String,
    port: u16,
    path: String,
    user: String,
    password: String,
}

impl FtpLocation {
    fn parse(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| TransportError::InvalidTarget {
                target: url.to_string(),
                reason: "FTP URL has no host".to_string(),
            })?;
        let (user, password) = match url.username() {
            "" => ("anonymous".to_string(), "anonymous@".to_string()),
            user => (
                user.to_string(),
                url.password().unwrap_or_default().to_string(),
            ),
        };

        let path = urlencoding::decode(url.path())
            .map_err(|e| TransportError::InvalidTarget {
                target: url.to_string(),
                reason: format!("FTP path is not valid UTF-8: {e}"),
            })?
            .into_owned();

        Ok(Self {
            url: url.to_string(),
            host: host.to_string(),
            port: url.port().unwrap_or(DEFAULT_PORT),
            path,
            user,
            password,
        })
    }

    fn error(&self, message: impl ToString) -> TransportError {
        TransportError::Ftp {
            url: self.url.clone(),
            message: message.to_string(),
        }
    }

    fn connect(&self) -> Result<FtpStream> {
        let mut ftp = FtpStream::connect((self.host.as_str(), self.port))
            .map_err(|e| self.error(e))?;
        ftp.login(&self.user, &self.password)
            .map_err(|e| self.error(e))?;
        ftp.set_mode(Mode::Passive);
        ftp.transfer_type(FileType::Binary)
            .map_err(|e| self.error(e))?;
        Ok(ftp)
    }

    /// Parent directories of the remote path, shallowest first.
    fn parent_dirs(&self) -> Vec<String> {
        let mut dirs = Vec::new();
        let mut current = String::new();
        let segments: Vec<&str> = self.path.split('/').filter(|s| !s.is_empty()).collect();
        for segment in segments.iter().take(segments.len().saturating_sub(1)) {
            current.push('/');
            current.push_str(segment);
            dirs.push(current.clone());
        }
        dirs
    }
}

fn quit(mut ftp: FtpStream) {
    if let Err(e) = ftp.quit() {
        debug!(error = %e, "FTP quit failed");
    }
}

async fn blocking<T, F>(location: &FtpLocation, task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| location.error(e))?
}

/// Buffered copy that reports every chunk to `progress`.
fn copy_counted(
    reader: &mut dyn Read,
    writer: &mut impl Write,
    progress: &TransferProgress,
) -> io::Result<u64> {
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut written = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
        progress.step(n as u64);
        written += n as u64;
    }
    writer.flush()?;
    Ok(written)
}

pub(super) async fn download(
    transport: &GenericTransport,
    url: &Url,
    destination: &Path,
) -> Result<()> {
    let location = FtpLocation::parse(url)?;
    let staging = staging_path(destination);
    let progress = transport.progress(None, destination);

    let task_location = location.clone();
    let task_staging = staging.clone();
    blocking(&location, move || {
        let mut ftp = task_location.connect()?;
        if let Ok(size) = ftp.size(&task_location.path) {
            progress.set_len(size as u64);
        }
        let mut file = std::fs::File::create(&task_staging)
            .map_err(|e| TransportError::io(&task_staging, e))?;
        let retrieved = ftp.retr(&task_location.path, |reader| {
            copy_counted(reader, &mut file, &progress).map_err(FtpError::ConnectionError)
        });
        quit(ftp);
        progress.finish();
        if let Err(e) = retrieved {
            if let Err(rm) = std::fs::remove_file(&task_staging) {
                debug!(path = %task_staging.display(), error = %rm, "could not remove partial download");
            }
            return Err(task_location.error(e));
        }
        Ok(())
    })
    .await?;

    commit(&staging, destination).await
}

pub(super) async fn upload(source: &Path, url: &Url) -> Result<()> {
    let location = FtpLocation::parse(url)?;
    let source: PathBuf = source.to_path_buf();

    let task_location = location.clone();
    blocking(&location, move || {
        let mut file =
            std::fs::File::open(&source).map_err(|e| TransportError::io(&source, e))?;
        let mut ftp = task_location.connect()?;
        for dir in task_location.parent_dirs() {
            // existing directories make mkdir fail
            let _ = ftp.mkdir(&dir);
        }
        let stored = ftp.put_file(&task_location.path, &mut file);
        quit(ftp);
        stored.map_err(|e| task_location.error(e))?;
        Ok(())
    })
    .await
}

pub(super) async fn create_folder(url: &Url) -> Result<()> {
    let location = FtpLocation::parse(url)?;

    let task_location = location.clone();
    blocking(&location, move || {
        let mut ftp = task_location.connect()?;
        for dir in task_location.parent_dirs() {
            let _ = ftp.mkdir(&dir);
        }
        let created = ftp.mkdir(&task_location.path);
        quit(ftp);
        if let Err(e) = created {
            debug!(path = %task_location.path, error = %e, "FTP mkdir failed, assuming it exists");
        }
        Ok(())
    })
    .await
}
