//! Adapter that drives a plugin's executable as a [`Transport`].
//!
//! The executable is invoked once per operation:
//!
//! ```text
//! <entry> download <source> <destination>
//! <entry> upload <destination> <source> [--metadata <metadata>]
//! <entry> prepare   (file set as JSON on stdin, only with batch-hooks)
//! <entry> finalize  (file set as JSON on stdin, only with batch-hooks)
//! ```
//!
//! Configuration reaches the process as `DOCKSTORE_PLUGIN_<KEY>` variables.
//! Exit status 0 is success; anything else fails with the captured stderr.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use provision_transport::{FileSet, PluginSettings, Result, Transport, TransportError};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::descriptor::PluginDescriptor;

pub const ENV_PREFIX: &str = "DOCKSTORE_PLUGIN_";

#[derive(Debug, Clone)]
pub struct CommandTransport {
    id: String,
    program: PathBuf,
    working_dir: PathBuf,
    schemes: BTreeSet<String>,
    batch_hooks: bool,
    env: Vec<(String, String)>,
}

impl CommandTransport {
    /// `None` when the descriptor names no executable.
    pub fn from_descriptor(descriptor: &PluginDescriptor) -> Option<Self> {
        let program = descriptor.entry.clone()?;
        Some(Self {
            id: descriptor.plugin_id.clone(),
            program,
            working_dir: descriptor.install_directory.clone(),
            schemes: descriptor.declared_schemes.clone(),
            batch_hooks: descriptor.batch_hooks,
            env: Vec::new(),
        })
    }

    pub fn env_key(key: &str) -> String {
        format!(
            "{ENV_PREFIX}{}",
            key.to_ascii_uppercase().replace(['-', '.'], "_")
        )
    }

    async fn run(&self, args: Vec<OsString>, stdin: Option<Vec<u8>>) -> Result<()> {
        let verb = args
            .first()
            .map(|a| a.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!(plugin = %self.id, program = %self.program.display(), %verb, "invoking plugin");

        let mut child = Command::new(&self.program)
            .args(&args)
            .current_dir(&self.working_dir)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TransportError::plugin(
                    &self.id,
                    format!("cannot start {}: {e}", self.program.display()),
                )
            })?;

        // a plugin may fill stdout before it reads stdin
        let writer = match (stdin, child.stdin.take()) {
            (Some(payload), Some(mut pipe)) => Some(tokio::spawn(async move {
                let written = pipe.write_all(&payload).await;
                drop(pipe);
                written
            })),
            _ => None,
        };

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| TransportError::plugin(&self.id, format!("{verb}: {e}")))?;

        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
                    debug!(plugin = %self.id, %verb, "plugin exited before reading its input");
                }
                Ok(Err(e)) => {
                    return Err(TransportError::plugin(&self.id, format!("{verb}: {e}")));
                }
                Err(e) => {
                    return Err(TransportError::plugin(&self.id, format!("{verb}: {e}")));
                }
            }
        }

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(TransportError::plugin(
                &self.id,
                format!("{verb} exited with {}: {}", output.status, stderr.trim()),
            ))
        }
    }

    async fn hook(&self, verb: &str, files: &FileSet) -> Result<()> {
        if !self.batch_hooks {
            return Ok(());
        }
        let payload = serde_json::to_vec(files)
            .map_err(|e| TransportError::plugin(&self.id, format!("{verb}: {e}")))?;
        self.run(vec![verb.into()], Some(payload)).await
    }
}

#[async_trait]
impl Transport for CommandTransport {
    fn name(&self) -> &str {
        &self.id
    }

    fn schemes_handled(&self) -> BTreeSet<String> {
        self.schemes.clone()
    }

    fn configure(&mut self, settings: &PluginSettings) -> Result<()> {
        self.env = settings
            .iter()
            .map(|(key, value)| (Self::env_key(key), value.clone()))
            .collect();
        Ok(())
    }

    async fn download_from(&self, source: &str, destination: &Path) -> Result<()> {
        self.run(
            vec!["download".into(), source.into(), destination.into()],
            None,
        )
        .await
    }

    async fn upload_to(
        &self,
        destination: &str,
        source: &Path,
        metadata: Option<&str>,
    ) -> Result<()> {
        let mut args: Vec<OsString> = vec!["upload".into(), destination.into(), source.into()];
        if let Some(metadata) = metadata {
            args.push("--metadata".into());
            args.push(metadata.into());
        }
        self.run(args, None).await
    }

    async fn prepare_file_set(&self, files: &FileSet) -> Result<()> {
        self.hook("prepare", files).await
    }

    async fn finalize_file_set(&self, files: &FileSet) -> Result<()> {
        self.hook("finalize", files).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use semver::Version;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::{TempDir, tempdir};

    fn script_plugin(body: &str, batch_hooks: bool) -> (TempDir, CommandTransport) {
        let dir = tempdir().unwrap();
        let entry = dir.path().join("plugin.sh");
        std::fs::write(&entry, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&entry, std::fs::Permissions::from_mode(0o755)).unwrap();

        let descriptor = PluginDescriptor {
            plugin_id: "script".to_string(),
            version: Version::new(1, 0, 0),
            install_directory: dir.path().to_path_buf(),
            declared_schemes: BTreeSet::from(["syn".to_string()]),
            entry: Some(entry),
            batch_hooks,
            description: None,
        };
        let transport = CommandTransport::from_descriptor(&descriptor).unwrap();
        (dir, transport)
    }

    #[test]
    fn test_env_key() {
        assert_eq!(
            CommandTransport::env_key("client-key"),
            "DOCKSTORE_PLUGIN_CLIENT_KEY"
        );
    }

    #[tokio::test]
    async fn test_download_passes_arguments() {
        let (dir, transport) = script_plugin(r#"printf '%s' "$2" > "$3""#, false);
        let dest = dir.path().join("out.txt");

        transport.download_from("syn://syn123", &dest).await.unwrap();

        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "syn://syn123");
    }

    #[tokio::test]
    async fn test_configuration_becomes_environment() {
        let (dir, mut transport) =
            script_plugin(r#"printf '%s' "$DOCKSTORE_PLUGIN_TOKEN" > "$3""#, false);
        transport
            .configure(&PluginSettings::from([("token".to_string(), "abc".to_string())]))
            .unwrap();
        let dest = dir.path().join("token.txt");

        transport.download_from("syn://x", &dest).await.unwrap();

        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_failure_carries_stderr() {
        let (_dir, transport) = script_plugin("echo 'quota exceeded' >&2; exit 3", false);

        let err = transport
            .upload_to("syn://x", Path::new("/tmp/x"), Some("{}"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("quota exceeded"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_hooks_receive_file_set_on_stdin() {
        let (dir, transport) = script_plugin(r#"cat > "$(dirname "$0")/$1.json""#, true);
        let mut files = FileSet::new();
        files.push("syn://a", "/tmp/a", None);

        transport.prepare_file_set(&files).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("prepare.json")).unwrap();
        assert!(written.contains("syn://a"));
    }

    #[tokio::test]
    async fn test_hook_output_larger_than_pipe_buffer() {
        let (dir, transport) = script_plugin(
            r#"head -c 262144 /dev/zero; head -c 131072 /dev/zero >&2; cat > "$(dirname "$0")/$1.json""#,
            true,
        );
        let mut files = FileSet::new();
        for i in 0..2000 {
            files.push(format!("syn://bucket/sample-{i:05}.bam"), format!("/w/{i}.bam"), None);
        }

        tokio::time::timeout(
            std::time::Duration::from_secs(30),
            transport.finalize_file_set(&files),
        )
        .await
        .expect("hook stalled")
        .unwrap();

        let written = std::fs::read_to_string(dir.path().join("finalize.json")).unwrap();
        assert!(written.contains("sample-01999"));
    }

    #[tokio::test]
    async fn test_hooks_skipped_without_batch_support() {
        let (dir, transport) = script_plugin("touch \"$(dirname \"$0\")/called\"", false);

        transport.finalize_file_set(&FileSet::new()).await.unwrap();

        assert!(!dir.path().join("called").exists());
    }
}
