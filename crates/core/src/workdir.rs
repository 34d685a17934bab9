//! Scoped scratch directories for components that shell out to file-based
//! solvers.
//!
//! A [`Manifest`] declares where an instance's directory lives and which
//! files it needs. A [`Workdir`] is the acquired directory; it is removed when
//! dropped, on every exit path, unless the manifest asks to keep it.
//!
//! [`Sandboxed`] wraps a [`ScopedComponent`] so each call runs in its own
//! freshly acquired directory. Sweep instances each get their own manifest
//! and never share a directory.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::{
    component::Component,
    error::ComponentError,
    partials::{PartialDeclaration, Partials},
    value::{SlotSpec, Slots},
};

/// Declares a scratch directory and the files to place in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    root: PathBuf,
    copy: Vec<PathBuf>,
    link: Vec<PathBuf>,
    keep: bool,
}

impl Manifest {
    /// A manifest for an empty directory at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            copy: Vec::new(),
            link: Vec::new(),
            keep: false,
        }
    }

    /// Copies `file` into the directory on every acquisition.
    #[must_use]
    pub fn copy(mut self, file: impl Into<PathBuf>) -> Self {
        self.copy.push(file.into());
        self
    }

    /// Links `file` into the directory on every acquisition.
    ///
    /// Uses a symbolic link on Unix and falls back to a copy elsewhere.
    #[must_use]
    pub fn link(mut self, file: impl Into<PathBuf>) -> Self {
        self.link.push(file.into());
        self
    }

    /// Keeps the directory after release, for debugging.
    #[must_use]
    pub fn keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// An acquired scratch directory.
#[derive(Debug)]
pub struct Workdir {
    path: PathBuf,
    keep: bool,
}

impl Workdir {
    /// Creates the directory described by `manifest`.
    ///
    /// Stale contents from an earlier run are removed first.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or a file cannot
    /// be placed in it. A partially populated directory is removed.
    pub fn acquire(manifest: &Manifest) -> io::Result<Self> {
        if manifest.root.exists() {
            fs::remove_dir_all(&manifest.root)?;
        }
        fs::create_dir_all(&manifest.root)?;

        // From here on, dropping `dir` cleans up after a failed placement.
        let dir = Self {
            path: manifest.root.clone(),
            keep: manifest.keep,
        };

        for file in &manifest.copy {
            fs::copy(file, dir.path.join(file_name(file)?))?;
        }
        for file in &manifest.link {
            place_link(file, &dir.path.join(file_name(file)?))?;
        }

        log::debug!("acquired scratch directory {}", dir.path.display());
        Ok(dir)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Workdir {
    fn drop(&mut self) {
        if self.keep {
            log::debug!("keeping scratch directory {}", self.path.display());
            return;
        }
        if let Err(err) = fs::remove_dir_all(&self.path) {
            log::warn!(
                "failed to remove scratch directory {}: {err}",
                self.path.display()
            );
        }
    }
}

/// Runs `f` inside a freshly acquired directory, releasing it afterwards.
///
/// # Errors
///
/// Returns an error if the directory cannot be acquired or `f` fails.
pub fn with_workdir<T, E>(manifest: &Manifest, f: impl FnOnce(&Path) -> Result<T, E>) -> Result<T, E>
where
    E: From<io::Error>,
{
    let dir = Workdir::acquire(manifest)?;
    f(dir.path())
}

fn file_name(file: &Path) -> io::Result<&std::ffi::OsStr> {
    file.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("`{}` has no file name", file.display()),
        )
    })
}

#[cfg(unix)]
fn place_link(original: &Path, link: &Path) -> io::Result<()> {
    let original = fs::canonicalize(original)?;
    std::os::unix::fs::symlink(original, link)
}

#[cfg(not(unix))]
fn place_link(original: &Path, link: &Path) -> io::Result<()> {
    fs::copy(original, link).map(|_| ())
}

/// A component whose calls need a scratch directory.
pub trait ScopedComponent {
    fn inputs(&self) -> Vec<SlotSpec>;

    fn outputs(&self) -> Vec<SlotSpec>;

    /// Evaluates inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying analysis fails.
    fn evaluate_in(&mut self, dir: &Path, inputs: &Slots) -> Result<Slots, ComponentError>;

    /// Linearizes inside `dir`; unsupported by default.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying analysis fails.
    fn linearize_in(&mut self, dir: &Path, inputs: &Slots) -> Result<Option<Partials>, ComponentError> {
        let _ = (dir, inputs);
        Ok(None)
    }

    fn partial_declarations(&self) -> Vec<PartialDeclaration> {
        Vec::new()
    }
}

/// Gives a [`ScopedComponent`] its own directory for every call.
#[derive(Debug)]
pub struct Sandboxed<C> {
    inner: C,
    manifest: Manifest,
}

impl<C: ScopedComponent> Sandboxed<C> {
    #[must_use]
    pub fn new(inner: C, manifest: Manifest) -> Self {
        Self { inner, manifest }
    }

    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    #[must_use]
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: ScopedComponent> Component for Sandboxed<C> {
    fn inputs(&self) -> Vec<SlotSpec> {
        self.inner.inputs()
    }

    fn outputs(&self) -> Vec<SlotSpec> {
        self.inner.outputs()
    }

    fn evaluate(&mut self, inputs: &Slots) -> Result<Slots, ComponentError> {
        let inner = &mut self.inner;
        with_workdir(&self.manifest, |dir| inner.evaluate_in(dir, inputs))
    }

    fn linearize(&mut self, inputs: &Slots) -> Result<Option<Partials>, ComponentError> {
        let inner = &mut self.inner;
        with_workdir(&self.manifest, |dir| inner.linearize_in(dir, inputs))
    }

    fn partial_declarations(&self) -> Vec<PartialDeclaration> {
        self.inner.partial_declarations()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writes its input to a file, reads it back, and fails on negative input.
    struct FileEcho;

    impl ScopedComponent for FileEcho {
        fn inputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::scalar("x", 0.0)]
        }

        fn outputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::scalar("y", 0.0)]
        }

        fn evaluate_in(&mut self, dir: &Path, inputs: &Slots) -> Result<Slots, ComponentError> {
            let x = inputs.scalar("x")?;
            let polar = fs::read_to_string(dir.join("polar.dat"))?;
            if x < 0.0 {
                return Err("negative input".into());
            }
            fs::write(dir.join("input.txt"), x.to_string())?;
            let y: f64 = fs::read_to_string(dir.join("input.txt"))?.parse()?;
            Ok(Slots::new().with("y", y + polar.trim().parse::<f64>()?))
        }
    }

    fn polar_file(dir: &Path) -> PathBuf {
        let file = dir.join("polar.dat");
        fs::write(&file, "0.5").unwrap();
        file
    }

    #[test]
    fn directory_is_removed_after_success() {
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("instance_0");
        let manifest = Manifest::new(&root).copy(polar_file(base.path()));

        let mut component = Sandboxed::new(FileEcho, manifest);
        let outputs = component.evaluate(&Slots::new().with("x", 2.0)).unwrap();

        assert_eq!(outputs.scalar("y").unwrap(), 2.5);
        assert!(!root.exists());
    }

    #[test]
    fn directory_is_removed_after_failure() {
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("instance_1");
        let manifest = Manifest::new(&root).link(polar_file(base.path()));

        let mut component = Sandboxed::new(FileEcho, manifest);
        let result = component.evaluate(&Slots::new().with("x", -1.0));

        assert_eq!(result.unwrap_err().to_string(), "negative input");
        assert!(!root.exists());
    }

    #[test]
    fn kept_directories_survive_and_are_refreshed() {
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("debug");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("stale.txt"), "old").unwrap();

        let manifest = Manifest::new(&root)
            .copy(polar_file(base.path()))
            .keep(true);
        let seen = with_workdir(&manifest, |dir| -> io::Result<bool> {
            Ok(dir.join("polar.dat").exists() && !dir.join("stale.txt").exists())
        })
        .unwrap();

        assert!(seen);
        assert!(root.join("polar.dat").exists());
    }

    #[test]
    fn missing_files_fail_acquisition_and_clean_up() {
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("instance_2");
        let manifest = Manifest::new(&root).copy(base.path().join("absent.dat"));

        assert!(Workdir::acquire(&manifest).is_err());
        assert!(!root.exists());
    }
}
