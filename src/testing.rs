use std::{
  fs,
  os::unix::fs::PermissionsExt,
  path::{Path, PathBuf},
};

/// Writes an executable shell script that stands in for an engine or tool.
pub fn stub(dir: &Path, name: &str, script: &str) -> PathBuf {
  let path = dir.join(name);
  fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
  fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

  path
}
