use crate::host::HostRunner;
use std::path::Path;
use std::time::Duration;

/// Write an executable stub standing in for a management CLI. The body is
/// a shell fragment with `$1`, `$2`, ... holding the subcommand arguments.
pub(crate) fn stub_program(dir: &Path, name: &str, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

pub(crate) fn runner() -> HostRunner {
    HostRunner::new(None, Duration::from_secs(5))
}
