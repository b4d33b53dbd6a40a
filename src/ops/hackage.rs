//! Packaging and uploading to Hackage with `cabal`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::util::process::{CommandRunner, ProcessBuilder};
use crate::util::shell::{Shell, Status};

/// Path of the source distribution `cabal sdist` writes for a version.
pub fn sdist_path(project_root: &Path, name: &str, version: &str) -> PathBuf {
    project_root
        .join("dist-newstyle")
        .join("sdist")
        .join(format!("{}-{}.tar.gz", name, version))
}

fn cabal(project_root: &Path) -> ProcessBuilder {
    ProcessBuilder::new("cabal").cwd(project_root)
}

/// Build Hackage documentation and the source tarball.
///
/// Returns the tarball path.
pub fn build_package(
    runner: &mut dyn CommandRunner,
    project_root: &Path,
    name: &str,
    version: &str,
    shell: &Shell,
) -> Result<PathBuf> {
    shell.status(Status::Building, "documentation for Hackage");
    runner.run_checked(&cabal(project_root).args(["haddock", "--haddock-for-hackage"]))?;

    shell.status(Status::Building, format!("source distribution {}-{}", name, version));
    runner.run_checked(&cabal(project_root).arg("sdist"))?;

    let tarball = sdist_path(project_root, name, version);
    if !tarball.is_file() {
        bail!("source distribution not found at {}", tarball.display());
    }
    Ok(tarball)
}

/// The `cabal upload --publish` command for `tarball`.
///
/// Credentials, when given, are passed on the command line so the upload
/// never waits for input. The password is masked in displayed commands.
pub fn upload_command(
    project_root: &Path,
    tarball: &Path,
    credentials: Option<(&str, &str)>,
) -> ProcessBuilder {
    let mut cmd = cabal(project_root).args(["upload", "--publish"]);
    if let Some((username, password)) = credentials {
        cmd = cmd
            .args(["--username", username, "--password", password])
            .mask(password);
    }
    cmd.arg(tarball)
}

/// Upload a built tarball as a published release.
pub fn upload(
    runner: &mut dyn CommandRunner,
    project_root: &Path,
    tarball: &Path,
    credentials: Option<(&str, &str)>,
    shell: &Shell,
) -> Result<()> {
    shell.status(Status::Publishing, tarball.display());
    runner.run_checked(&upload_command(project_root, tarball, credentials))?;
    shell.status(Status::Published, "package to Hackage");
    Ok(())
}
