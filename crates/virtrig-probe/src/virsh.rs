use crate::host::HostRunner;
use crate::ProbeError;
use std::io::Write;
use tempfile::NamedTempFile;

/// Thin wrapper over the `virsh` management CLI.
///
/// Probes compose raw argument lists; this type only centralizes the
/// program name, the runner, and the temp-file dance used when a resource
/// is (re)defined from a recorded XML export.
#[derive(Debug, Clone)]
pub struct Virsh {
    runner: HostRunner,
    program: String,
}

impl Virsh {
    pub fn new(runner: HostRunner) -> Self {
        Self {
            runner,
            program: "virsh".to_owned(),
        }
    }

    /// Override the executable, used by tests to point at a stub script.
    pub fn with_program(runner: HostRunner, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    /// Run a virsh subcommand; non-zero exit is an error.
    pub fn run(&self, args: &[&str]) -> Result<String, ProbeError> {
        self.runner.run_checked(&self.program, args)
    }

    /// Write recorded XML lines to a temp file and run `virsh <verb> <file>`
    /// (`define`, `create`, `net-define`, ...). The temp file is removed on
    /// all exit paths by the `NamedTempFile` guard.
    pub fn run_with_xml(&self, verb: &str, xml_lines: &[String]) -> Result<String, ProbeError> {
        let mut file = NamedTempFile::new()?;
        for line in xml_lines {
            writeln!(file, "{line}")?;
        }
        file.flush()?;
        let path = file.path().to_string_lossy().into_owned();
        self.run(&[verb, &path])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{runner, stub_program};

    fn stub_virsh(dir: &std::path::Path, body: &str) -> String {
        stub_program(dir, "virsh", body)
    }

    #[test]
    fn run_returns_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let program = stub_virsh(dir.path(), r#"echo "args: $*""#);
        let virsh = Virsh::with_program(runner(), program);
        let out = virsh.run(&["list", "--all", "--name"]).unwrap();
        assert_eq!(out.trim(), "args: list --all --name");
    }

    #[test]
    fn run_surfaces_failure() {
        let dir = tempfile::tempdir().unwrap();
        let program = stub_virsh(dir.path(), "echo 'error: no such domain' >&2; exit 1");
        let virsh = Virsh::with_program(runner(), program);
        let err = virsh.run(&["dominfo", "ghost"]);
        match err {
            Err(ProbeError::CommandFailed { status, stderr, .. }) => {
                assert_eq!(status, 1);
                assert!(stderr.contains("no such domain"));
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[test]
    fn run_with_xml_passes_a_readable_file() {
        let dir = tempfile::tempdir().unwrap();
        // The stub cats the file it was handed, proving it existed with
        // the recorded content at invocation time.
        let program = stub_virsh(dir.path(), r#"cat "$2""#);
        let virsh = Virsh::with_program(runner(), program);
        let xml = vec!["<domain>".to_owned(), "</domain>".to_owned()];
        let out = virsh.run_with_xml("define", &xml).unwrap();
        assert_eq!(out, "<domain>\n</domain>\n");
    }
}
