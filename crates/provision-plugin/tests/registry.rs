use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use provision_plugin::{PluginCatalog, PluginError, PluginLoader, PluginRegistry};
use provision_transport::{GenericTransport, PluginSettings, Transport};
use tempfile::tempdir;

struct Recorder {
    id: String,
}

#[async_trait]
impl Transport for Recorder {
    fn name(&self) -> &str {
        &self.id
    }

    fn schemes_handled(&self) -> BTreeSet<String> {
        BTreeSet::from(["s3".to_string()])
    }

    fn configure(&mut self, settings: &PluginSettings) -> provision_transport::Result<()> {
        if let Some(endpoint) = settings.get("endpoint") {
            self.id = format!("{}@{endpoint}", self.id);
        }
        Ok(())
    }

    async fn download_from(&self, _: &str, _: &Path) -> provision_transport::Result<()> {
        Ok(())
    }

    async fn upload_to(&self, _: &str, _: &Path, _: Option<&str>) -> provision_transport::Result<()> {
        Ok(())
    }
}

fn loader() -> PluginLoader {
    PluginLoader::new().register("s3-plugin", |descriptor| {
        Box::new(Recorder {
            id: descriptor.plugin_id.clone(),
        })
    })
}

fn install(root: &Path, version: &str) -> PathBuf {
    let dir = root.join(format!("s3-plugin-{version}"));
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("plugin.toml"),
        format!("id = \"s3-plugin\"\nversion = \"{version}\"\nschemes = [\"s3\"]\n"),
    )
    .unwrap();
    fs::write(root.join(format!("s3-plugin-{version}.zip")), "").unwrap();
    dir
}

fn listing(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(root)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_only_highest_version_survives_cleanup() {
    let dir = tempdir().unwrap();
    install(dir.path(), "1.0.0");
    install(dir.path(), "1.2.0");
    install(dir.path(), "1.1.0");

    let plugins = PluginRegistry::new(dir.path())
        .initialize(&loader(), &BTreeMap::new())
        .unwrap();

    assert_eq!(plugins.len(), 1);
    assert_eq!(
        plugins.get(0).unwrap().descriptor.version,
        semver::Version::new(1, 2, 0)
    );
    assert_eq!(
        listing(dir.path()),
        vec!["s3-plugin-1.2.0", "s3-plugin-1.2.0.zip"]
    );
}

#[test]
fn test_second_run_changes_nothing() {
    let dir = tempdir().unwrap();
    install(dir.path(), "0.9.0");
    install(dir.path(), "1.0.0");
    let registry = PluginRegistry::new(dir.path());

    registry.initialize(&loader(), &BTreeMap::new()).unwrap();
    let after_first = listing(dir.path());

    assert!(registry.prepare_root().unwrap().is_empty());
    let discovery = registry.discover().unwrap();
    assert!(registry.cleanup(&discovery).unwrap().is_empty());
    assert_eq!(listing(dir.path()), after_first);
}

#[test]
fn test_invalid_descriptor_is_fatal() {
    let dir = tempdir().unwrap();
    install(dir.path(), "1.0.0");
    let broken = dir.path().join("broken");
    fs::create_dir(&broken).unwrap();
    fs::write(broken.join("plugin.toml"), "id = ").unwrap();

    let err = PluginRegistry::new(dir.path())
        .initialize(&loader(), &BTreeMap::new())
        .unwrap_err();

    match err {
        PluginError::DescriptorInvalid { dir, .. } => assert_eq!(dir, broken),
        other => panic!("expected DescriptorInvalid, got {other:?}"),
    }
    // nothing is deleted when discovery fails
    assert!(dir.path().join("s3-plugin-1.0.0").exists());
}

#[test]
fn test_missing_root_is_created() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("plugins");

    let plugins = PluginRegistry::new(&root)
        .initialize(&loader(), &BTreeMap::new())
        .unwrap();

    assert!(plugins.is_empty());
    assert!(root.is_dir());
}

#[test]
fn test_configuration_section_reaches_plugin() {
    let dir = tempdir().unwrap();
    install(dir.path(), "1.0.0");
    let settings = BTreeMap::from([(
        "s3-plugin".to_string(),
        PluginSettings::from([("endpoint".to_string(), "https://minio.local".to_string())]),
    )]);

    let plugins = PluginRegistry::new(dir.path())
        .initialize(&loader(), &settings)
        .unwrap();

    assert_eq!(
        plugins.get(0).unwrap().transport.name(),
        "s3-plugin@https://minio.local"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_catalog_install_then_expand() {
    let dir = tempdir().unwrap();
    let published = dir.path().join("published.zip");
    let mut zip = zip::ZipWriter::new(fs::File::create(&published).unwrap());
    zip.start_file("plugin.toml", zip::write::SimpleFileOptions::default())
        .unwrap();
    zip.write_all(b"id = \"s3-plugin\"\nversion = \"2.0.0\"\nschemes = [\"s3\"]\n")
        .unwrap();
    zip.finish().unwrap();

    let catalog_path = dir.path().join("plugins.json");
    fs::write(
        &catalog_path,
        format!(
            r#"[{{"name": "s3-plugin", "version": "2.0.0", "location": "file://{}"}}]"#,
            published.display()
        ),
    )
    .unwrap();
    let root = dir.path().join("plugins");

    let catalog = PluginCatalog::load_or_create(&catalog_path).unwrap();
    let transport = GenericTransport::new().show_progress(false);
    let report = catalog.install(&root, &transport).await.unwrap();
    assert_eq!(report.downloaded, vec![root.join("s3-plugin-2.0.0.zip")]);

    let again = catalog.install(&root, &transport).await.unwrap();
    assert!(again.downloaded.is_empty());
    assert_eq!(again.skipped.len(), 1);

    let plugins = PluginRegistry::new(&root)
        .initialize(&loader(), &BTreeMap::new())
        .unwrap();
    assert_eq!(plugins.len(), 1);
    assert!(root.join("s3-plugin-2.0.0/plugin.toml").is_file());
}

#[test]
fn test_schemes_come_from_the_live_plugin() {
    let dir = tempdir().unwrap();
    let plugin = dir.path().join("s3-plugin-1.0.0");
    fs::create_dir_all(&plugin).unwrap();
    fs::write(
        plugin.join("plugin.toml"),
        "id = \"s3-plugin\"\nversion = \"1.0.0\"\nschemes = [\"syn\"]\n",
    )
    .unwrap();

    let plugins = PluginRegistry::new(dir.path())
        .initialize(&loader(), &BTreeMap::new())
        .unwrap();

    let descriptor = &plugins.get(0).unwrap().descriptor;
    assert_eq!(descriptor.declared_schemes, BTreeSet::from(["s3".to_string()]));
    assert!(descriptor.handles("S3"));
    assert!(!descriptor.handles("syn"));
}
