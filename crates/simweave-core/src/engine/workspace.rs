use crate::core::template::RenderedInput;
use chrono::Local;
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, warn};

const NAME_ATTEMPTS: usize = 16;
const RANDOM_SUFFIX_LEN: usize = 6;

// The working directory is process-wide; entered workspaces take turns.
static CWD_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Failed to create workspace '{path}': {source}")]
    Create { path: String, source: io::Error },
    #[error("Failed to stage '{path}' into the workspace: {source}")]
    Stage { path: String, source: io::Error },
    #[error("Failed to write rendered input '{path}': {source}")]
    Write { path: String, source: io::Error },
    #[error("Failed to enter workspace '{path}': {source}")]
    Enter { path: String, source: io::Error },
    #[error("Failed to scan workspace '{path}': {source}")]
    Scan { path: String, source: io::Error },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceOptions {
    /// Parent directory for workspaces. Defaults to the system temp dir.
    pub root: Option<PathBuf>,
    pub prefix: String,
    /// Keep the directory after the invocation instead of removing it.
    pub retain: bool,
    /// Switch the process working directory into the workspace while it lives.
    pub enter: bool,
}

impl Default for WorkspaceOptions {
    fn default() -> Self {
        Self {
            root: None,
            prefix: "simweave".to_string(),
            retain: false,
            enter: false,
        }
    }
}

struct Entered {
    previous: PathBuf,
    _lock: MutexGuard<'static, ()>,
}

/// An exclusively owned, uniquely named execution directory.
///
/// Dropping the workspace restores the previous working directory (if it was
/// entered) and removes the directory unless it is retained. This happens on
/// every exit path, including unwinding.
pub struct Workspace {
    path: PathBuf,
    name: String,
    retain: bool,
    entered: Option<Entered>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("path", &self.path)
            .field("retain", &self.retain)
            .field("entered", &self.entered.is_some())
            .finish()
    }
}

impl Workspace {
    pub fn create(options: &WorkspaceOptions) -> Result<Self, WorkspaceError> {
        let root = options.root.clone().unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&root).map_err(|e| WorkspaceError::Create {
            path: root.to_string_lossy().to_string(),
            source: e,
        })?;

        let (path, name) = create_unique_dir(&root, &options.prefix)?;
        let mut workspace = Self {
            path,
            name,
            retain: options.retain,
            entered: None,
        };
        if options.enter {
            workspace.enter()?;
        }
        debug!(path = %workspace.path.display(), "Created workspace.");
        Ok(workspace)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The directory name, unique across invocations; used as the job id.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_entered(&self) -> bool {
        self.entered.is_some()
    }

    pub fn is_retained(&self) -> bool {
        self.retain
    }

    /// Copies a raw input file into the workspace root, keeping its file name.
    pub fn stage_file(&self, source: &Path) -> Result<PathBuf, WorkspaceError> {
        let stage_err = |e: io::Error| WorkspaceError::Stage {
            path: source.to_string_lossy().to_string(),
            source: e,
        };
        let file_name = source.file_name().ok_or_else(|| {
            stage_err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "path has no file name",
            ))
        })?;
        let target = self.path.join(file_name);
        std::fs::copy(source, &target).map_err(stage_err)?;
        Ok(target)
    }

    /// Writes `input` under the workspace. Names must be relative and may not
    /// climb out of the workspace.
    pub fn write_input(&self, input: &RenderedInput) -> Result<PathBuf, WorkspaceError> {
        let relative = Path::new(&input.file_name);
        let contained = !input.file_name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained {
            return Err(WorkspaceError::Write {
                path: input.file_name.clone(),
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "input name must stay inside the workspace",
                ),
            });
        }

        let target = self.path.join(relative);
        let write_err = |e: io::Error| WorkspaceError::Write {
            path: target.to_string_lossy().to_string(),
            source: e,
        };
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(&target, &input.contents).map_err(write_err)?;
        Ok(target)
    }

    /// Gives up ownership of the directory; it will not be removed.
    pub fn keep(mut self) -> PathBuf {
        self.retain = true;
        self.path.clone()
    }

    fn enter(&mut self) -> Result<(), WorkspaceError> {
        let enter_err = |e: io::Error| WorkspaceError::Enter {
            path: self.path.to_string_lossy().to_string(),
            source: e,
        };
        let lock = CWD_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let previous = std::env::current_dir().map_err(enter_err)?;
        std::env::set_current_dir(&self.path).map_err(enter_err)?;
        self.entered = Some(Entered {
            previous,
            _lock: lock,
        });
        Ok(())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(entered) = self.entered.take() {
            if let Err(e) = std::env::set_current_dir(&entered.previous) {
                warn!(
                    path = %entered.previous.display(),
                    error = %e,
                    "Failed to restore working directory."
                );
            }
        }
        if self.retain {
            debug!(path = %self.path.display(), "Retaining workspace.");
        } else if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove workspace.");
        }
    }
}

fn create_unique_dir(root: &Path, prefix: &str) -> Result<(PathBuf, String), WorkspaceError> {
    let mut rng = rand::thread_rng();
    let mut last_err = None;
    for _ in 0..NAME_ATTEMPTS {
        let suffix: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(RANDOM_SUFFIX_LEN)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        let name = format!(
            "{}-{}-{}",
            prefix,
            Local::now().format("%Y%m%d%H%M%S"),
            suffix
        );
        let path = root.join(&name);
        match std::fs::create_dir(&path) {
            Ok(()) => return Ok((path, name)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => last_err = Some(e),
            Err(e) => {
                return Err(WorkspaceError::Create {
                    path: path.to_string_lossy().to_string(),
                    source: e,
                });
            }
        }
    }
    Err(WorkspaceError::Create {
        path: root.to_string_lossy().to_string(),
        source: last_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::AlreadyExists)),
    })
}

/// Creates a workspace, stages `extra_inputs` into it and runs `f` inside it.
/// The workspace is cleaned up when `f` returns, whatever the outcome.
pub fn with_workspace<T, E, F>(
    options: &WorkspaceOptions,
    extra_inputs: &[PathBuf],
    f: F,
) -> Result<T, E>
where
    E: From<WorkspaceError>,
    F: FnOnce(&Workspace) -> Result<T, E>,
{
    let workspace = Workspace::create(options)?;
    for input in extra_inputs {
        workspace.stage_file(input)?;
    }
    f(&workspace)
}

/// Recursively copies the contents of `from` into `to`, creating `to`.
pub fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
