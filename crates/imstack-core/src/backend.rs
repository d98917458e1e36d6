//! Graphics-API detection and one-shot backend selection.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use ahash::AHashSet;
use tracing::{error, info, warn};

use crate::error::BackendError;

// ─── BackendKind ─────────────────────────────────────────────────────────────

/// Known graphics APIs, declared in selection priority order.
///
/// D3D12 hosts commonly load `d3d11.dll` as well (11on12, DXGI interop), so
/// D3D12 is checked before D3D11.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BackendKind {
    D3D12,
    D3D11,
    D3D10,
    D3D9,
    Vulkan,
    OpenGl,
}

impl BackendKind {
    pub const PRIORITY: [BackendKind; 6] = [
        BackendKind::D3D12,
        BackendKind::D3D11,
        BackendKind::D3D10,
        BackendKind::D3D9,
        BackendKind::Vulkan,
        BackendKind::OpenGl,
    ];

    /// Loaded-module names that prove the API is in use.
    pub fn evidence(self) -> &'static [&'static str] {
        match self {
            BackendKind::D3D12  => &["d3d12.dll"],
            BackendKind::D3D11  => &["d3d11.dll"],
            BackendKind::D3D10  => &["d3d10.dll", "d3d10_1.dll"],
            BackendKind::D3D9   => &["d3d9.dll"],
            BackendKind::Vulkan => &["vulkan-1.dll"],
            BackendKind::OpenGl => &["opengl32.dll"],
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::D3D12  => "Direct3D 12",
            BackendKind::D3D11  => "Direct3D 11",
            BackendKind::D3D10  => "Direct3D 10",
            BackendKind::D3D9   => "Direct3D 9",
            BackendKind::Vulkan => "Vulkan",
            BackendKind::OpenGl => "OpenGL",
        })
    }
}

// ─── Evidence ────────────────────────────────────────────────────────────────

/// Passive view of the host process. Must not load anything.
pub trait ModuleProbe {
    fn is_loaded(&self, module_name: &str) -> bool;
}

/// A fixed set of module names, case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct LoadedModules(AHashSet<String>);

impl LoadedModules {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(names.into_iter().map(|s| s.as_ref().to_ascii_lowercase()).collect())
    }
}

impl ModuleProbe for LoadedModules {
    fn is_loaded(&self, module_name: &str) -> bool {
        self.0.contains(&module_name.to_ascii_lowercase())
    }
}

// ─── Backend ─────────────────────────────────────────────────────────────────

/// One graphics-API integration.
pub trait Backend: Send {
    fn kind(&self) -> BackendKind;

    /// Whether this API is active in the process. No side effects.
    fn is_active(&self, probe: &dyn ModuleProbe) -> bool {
        self.kind().evidence().iter().any(|m| probe.is_loaded(m))
    }

    /// Locate the API's entry points and install interceptors on them.
    fn init(&mut self) -> anyhow::Result<()>;

    /// Remove every interceptor and release device objects. Idempotent.
    fn dispose(&mut self);
}

// ─── BackendSelector ─────────────────────────────────────────────────────────

/// Picks at most one backend for the life of the process.
#[derive(Default)]
pub struct BackendSelector {
    active:    Option<Box<dyn Backend>>,
    attempted: bool,
}

impl fmt::Debug for BackendSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSelector")
            .field("active", &self.active.as_ref().map(|b| b.kind()))
            .field("attempted", &self.attempted)
            .finish()
    }
}

impl BackendSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_kind(&self) -> Option<BackendKind> {
        self.active.as_ref().map(|b| b.kind())
    }

    /// Initialize the backend for the highest-priority API that is loaded.
    ///
    /// Fails closed: when no candidate implements that API, or its `init`
    /// errors or panics, no other candidate is tried. Only the first call
    /// does anything.
    pub fn select(
        &mut self,
        mut candidates: Vec<Box<dyn Backend>>,
        probe: &dyn ModuleProbe,
    ) -> Result<BackendKind, BackendError> {
        if self.attempted {
            warn!("backend selection already ran, ignoring");
            return Err(BackendError::AlreadySelected);
        }
        self.attempted = true;

        let Some(kind) = BackendKind::PRIORITY
            .into_iter()
            .find(|k| k.evidence().iter().any(|m| probe.is_loaded(m)))
        else {
            warn!("no supported graphics API detected");
            return Err(BackendError::NoneDetected);
        };
        // Hooking a lower-priority API would attach to the wrong swap chain.
        let Some(pos) = candidates.iter().position(|b| b.kind() == kind && b.is_active(probe)) else {
            warn!("{kind} detected but no backend implements it");
            return Err(BackendError::Unsupported(kind));
        };
        let mut backend = candidates.swap_remove(pos);
        drop(candidates);
        info!("{kind} detected, initializing backend");

        match catch_unwind(AssertUnwindSafe(|| backend.init())) {
            Ok(Ok(())) => {
                info!("{kind} backend ready");
                self.active = Some(backend);
                Ok(kind)
            }
            Ok(Err(source)) => {
                error!("{kind} backend initialization failed: {source:#}");
                backend.dispose();
                Err(BackendError::Init { kind, source })
            }
            Err(_) => {
                error!("{kind} backend initialization panicked");
                backend.dispose();
                Err(BackendError::Panicked(kind))
            }
        }
    }

    /// Tear down the active backend, if any.
    pub fn dispose(&mut self) {
        if let Some(mut backend) = self.active.take() {
            info!("disposing {} backend", backend.kind());
            backend.dispose();
        }
    }
}

impl Drop for BackendSelector {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Journal(Mutex<Vec<String>>);

    impl Journal {
        fn push(&self, s: String) { self.0.lock().push(s); }
        fn entries(&self) -> Vec<String> { self.0.lock().clone() }
    }

    struct FakeBackend {
        kind:    BackendKind,
        fail:    bool,
        panic:   bool,
        journal: Arc<Journal>,
    }

    impl FakeBackend {
        fn boxed(kind: BackendKind, journal: &Arc<Journal>) -> Box<dyn Backend> {
            Box::new(Self { kind, fail: false, panic: false, journal: journal.clone() })
        }
    }

    impl Backend for FakeBackend {
        fn kind(&self) -> BackendKind { self.kind }

        fn init(&mut self) -> anyhow::Result<()> {
            self.journal.push(format!("init {:?}", self.kind));
            if self.panic {
                panic!("device creation exploded");
            }
            if self.fail {
                anyhow::bail!("no swap chain");
            }
            Ok(())
        }

        fn dispose(&mut self) {
            self.journal.push(format!("dispose {:?}", self.kind));
        }
    }

    #[test]
    fn competing_apis_select_by_priority() {
        let journal = Arc::new(Journal::default());
        let probe = LoadedModules::new(["D3D11.dll", "opengl32.dll", "kernel32.dll"]);
        let mut selector = BackendSelector::new();
        let kind = selector
            .select(
                vec![
                    FakeBackend::boxed(BackendKind::OpenGl, &journal),
                    FakeBackend::boxed(BackendKind::D3D11, &journal),
                ],
                &probe,
            )
            .unwrap();
        assert_eq!(kind, BackendKind::D3D11);
        assert_eq!(journal.entries(), vec!["init D3D11".to_string()]);
    }

    #[test]
    fn d3d12_wins_over_d3d11() {
        let journal = Arc::new(Journal::default());
        let probe = LoadedModules::new(["d3d11.dll", "d3d12.dll"]);
        let mut selector = BackendSelector::new();
        let kind = selector
            .select(
                vec![
                    FakeBackend::boxed(BackendKind::D3D11, &journal),
                    FakeBackend::boxed(BackendKind::D3D12, &journal),
                ],
                &probe,
            )
            .unwrap();
        assert_eq!(kind, BackendKind::D3D12);
        assert_eq!(selector.active_kind(), Some(BackendKind::D3D12));
    }

    #[test]
    fn d3d12_host_never_gets_the_d3d11_backend() {
        let journal = Arc::new(Journal::default());
        let probe = LoadedModules::new(["d3d12.dll", "d3d11.dll", "dxgi.dll"]);
        let mut selector = BackendSelector::new();
        let err = selector
            .select(vec![FakeBackend::boxed(BackendKind::D3D11, &journal)], &probe)
            .unwrap_err();
        assert!(matches!(err, BackendError::Unsupported(BackendKind::D3D12)));
        assert!(journal.entries().is_empty());
        assert_eq!(selector.active_kind(), None);
    }

    #[test]
    fn init_failure_fails_closed() {
        let journal = Arc::new(Journal::default());
        let probe = LoadedModules::new(["d3d11.dll", "opengl32.dll"]);
        let failing: Box<dyn Backend> = Box::new(FakeBackend {
            kind: BackendKind::D3D11,
            fail: true,
            panic: false,
            journal: journal.clone(),
        });
        let mut selector = BackendSelector::new();
        let err = selector
            .select(vec![failing, FakeBackend::boxed(BackendKind::OpenGl, &journal)], &probe)
            .unwrap_err();
        assert!(matches!(err, BackendError::Init { kind: BackendKind::D3D11, .. }));
        assert_eq!(journal.entries(), vec!["init D3D11".to_string(), "dispose D3D11".to_string()]);
        assert_eq!(selector.active_kind(), None);
    }

    #[test]
    fn init_panic_is_contained() {
        let journal = Arc::new(Journal::default());
        let probe = LoadedModules::new(["d3d11.dll"]);
        let panicking: Box<dyn Backend> = Box::new(FakeBackend {
            kind: BackendKind::D3D11,
            fail: false,
            panic: true,
            journal: journal.clone(),
        });
        let mut selector = BackendSelector::new();
        let err = selector.select(vec![panicking], &probe).unwrap_err();
        assert!(matches!(err, BackendError::Panicked(BackendKind::D3D11)));
        assert!(journal.entries().contains(&"dispose D3D11".to_string()));
    }

    #[test]
    fn selection_is_one_shot() {
        let journal = Arc::new(Journal::default());
        let probe = LoadedModules::new(["d3d11.dll"]);
        let mut selector = BackendSelector::new();
        selector.select(vec![FakeBackend::boxed(BackendKind::D3D11, &journal)], &probe).unwrap();
        let again = selector.select(vec![FakeBackend::boxed(BackendKind::D3D11, &journal)], &probe);
        assert!(matches!(again, Err(BackendError::AlreadySelected)));
        assert_eq!(journal.entries(), vec!["init D3D11".to_string()]);

        selector.dispose();
        selector.dispose();
        assert_eq!(journal.entries().last().unwrap(), "dispose D3D11");
    }

    #[test]
    fn nothing_loaded_means_no_backend() {
        let journal = Arc::new(Journal::default());
        let mut selector = BackendSelector::new();
        let err = selector
            .select(vec![FakeBackend::boxed(BackendKind::D3D11, &journal)], &LoadedModules::default())
            .unwrap_err();
        assert!(matches!(err, BackendError::NoneDetected));
        assert!(journal.entries().is_empty());
    }
}
