use provision_fs::{
    FallbackStrategy, HardlinkOrCopyOptions, Placement, ensure_parent, hardlink_or_copy,
    walk_tree,
};
use tempfile::tempdir;

#[cfg(unix)]
#[test]
fn test_hardlink_shares_inode() {
    use std::os::unix::fs::MetadataExt;

    let dir = tempdir().unwrap();
    let src = dir.path().join("source.txt");
    let dest = dir.path().join("hardlink.txt");
    std::fs::write(&src, "shared content").unwrap();

    let placement = hardlink_or_copy(&src, &dest, &HardlinkOrCopyOptions::new()).unwrap();
    assert_eq!(placement, Placement::Linked);

    let src_meta = std::fs::metadata(&src).unwrap();
    let dest_meta = std::fs::metadata(&dest).unwrap();
    assert_eq!(src_meta.ino(), dest_meta.ino());
}

#[test]
fn test_ensure_parent_then_link_into_new_directory() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("data.txt");
    std::fs::write(&src, "payload").unwrap();
    let dest = dir.path().join("work/inputs/x/data.txt");

    ensure_parent(&dest).unwrap();
    hardlink_or_copy(&src, &dest, &HardlinkOrCopyOptions::new()).unwrap();

    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "payload");
}

#[test]
fn test_copied_tree_matches_walk() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("outputs");
    std::fs::create_dir_all(src.join("logs")).unwrap();
    std::fs::write(src.join("result.vcf"), "vcf").unwrap();
    std::fs::write(src.join("logs/run.log"), "log").unwrap();
    let dest = dir.path().join("mirror");

    let options = HardlinkOrCopyOptions::new().fallback(FallbackStrategy::Copy);
    hardlink_or_copy(&src, &dest, &options).unwrap();

    assert_eq!(walk_tree(&src, &[]).unwrap(), walk_tree(&dest, &[]).unwrap());
}
