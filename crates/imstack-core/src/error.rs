//! Error types shared by the core and the backend crates.

use crate::backend::BackendKind;

// ─── Hook errors ─────────────────────────────────────────────────────────────

/// Failure of a single interceptor operation.
///
/// Fatal to the hook that produced it, never to the process.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HookError {
    #[error("hook target is a null pointer")]
    NullTarget,
    #[error("hook target {0:#x} is not executable")]
    NotExecutable(usize),
    #[error("a hook is already installed on {0:#x}")]
    AlreadyCreated(usize),
    #[error("no hook is installed on {0:#x}")]
    NotCreated(usize),
    #[error("hook on {0:#x} has been disposed")]
    Disposed(usize),
    #[error("hook engine failure (status {0})")]
    Engine(i32),
}

// ─── Backend errors ──────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("a graphics backend has already been selected")]
    AlreadySelected,
    #[error("no supported graphics API is loaded in this process")]
    NoneDetected,
    #[error("{0} is in use but no backend implements it")]
    Unsupported(BackendKind),
    #[error("{kind} backend initialization failed: {source}")]
    Init {
        kind: BackendKind,
        #[source]
        source: anyhow::Error,
    },
    #[error("{0} backend initialization panicked")]
    Panicked(BackendKind),
}

// ─── Registration errors ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    #[error("module `{0}` has no render callback")]
    MissingRender(String),
    #[error("module id must not be empty")]
    EmptyId,
    #[error("the overlay is not running")]
    NotRunning,
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
