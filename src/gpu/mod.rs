//! Solver facade: the boundary between the frame pipeline and whatever
//! executes the constraint solve.

pub mod ash_backend;
pub mod cpu_backend;

pub use ash_backend::AshSolver;
pub use cpu_backend::CpuSolver;

use std::fmt;
use std::thread::JoinHandle;

use crate::core::assets::AssetRegistry;
use crate::core::params::SimParams;
use crate::core::shapes::ShapeBuffers;
use crate::core::store::{ParticleStore, StoreError};

/// Errors surfaced by solver backends.
#[derive(Debug)]
pub enum SolverError {
    /// The accelerator or its allocator could not be created.
    DeviceInit(String),
    /// A host buffer does not match the size the device was set up with.
    BufferMismatch {
        buffer: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A device call failed after initialization.
    Device(String),
    /// The store failed validation before upload.
    Store(StoreError),
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::DeviceInit(msg) => write!(f, "Device init failed: {msg}"),
            Self::BufferMismatch {
                buffer,
                expected,
                actual,
            } => write!(
                f,
                "Buffer mismatch: {buffer} holds {actual} elements, device expects {expected}"
            ),
            Self::Device(msg) => write!(f, "Device error: {msg}"),
            Self::Store(err) => write!(f, "Invalid store: {err}"),
        }
    }
}

impl std::error::Error for SolverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for SolverError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<ash_renderer::AshError> for SolverError {
    fn from(err: ash_renderer::AshError) -> Self {
        Self::Device(err.to_string())
    }
}

/// Convenient Result alias for solver operations.
pub type Result<T> = std::result::Result<T, SolverError>;

/// Which host buffers an upload transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadScope {
    /// Every buffer; (re)sizes the device image.
    Full,
    /// Per-frame data: positions, velocities, phases and the active set.
    Dynamic,
    /// Velocities only.
    Velocities,
}

/// Which device buffers a download copies back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadbackScope {
    /// Positions, velocities, normals, triangle normals and rigid transforms.
    Frame,
    Positions,
}

/// Join handle for an in-flight dispatch.
///
/// Dropping the handle blocks until the work finishes; there is no cancellation.
#[must_use = "dropping a DispatchHandle blocks until the dispatch completes"]
pub struct DispatchHandle {
    pending: Pending,
}

enum Pending {
    Done,
    Worker(JoinHandle<()>),
    /// Work already submitted elsewhere; the closure blocks until it finishes.
    Wait(Box<dyn FnOnce() + Send>),
}

impl DispatchHandle {
    /// Handle for work that already finished synchronously.
    pub fn completed() -> Self {
        Self {
            pending: Pending::Done,
        }
    }

    /// Runs `work` on a worker thread.
    pub fn spawn<F>(work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            pending: Pending::Worker(std::thread::spawn(work)),
        }
    }

    /// Wraps work submitted to a device; `wait` runs on the joining thread.
    pub fn deferred<F>(wait: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            pending: Pending::Wait(Box::new(wait)),
        }
    }

    /// Blocks until the dispatch completes, re-raising a worker panic.
    pub fn join(mut self) {
        match std::mem::replace(&mut self.pending, Pending::Done) {
            Pending::Done => {}
            Pending::Worker(worker) => {
                if let Err(payload) = worker.join() {
                    std::panic::resume_unwind(payload);
                }
            }
            Pending::Wait(wait) => wait(),
        }
    }

    fn finish(&mut self) {
        match std::mem::replace(&mut self.pending, Pending::Done) {
            Pending::Done => {}
            Pending::Worker(worker) => {
                let _ = worker.join();
            }
            Pending::Wait(wait) => wait(),
        }
    }
}

impl fmt::Debug for DispatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = match self.pending {
            Pending::Done => "done",
            Pending::Worker(_) => "worker",
            Pending::Wait(_) => "device",
        };
        f.debug_struct("DispatchHandle").field("pending", &state).finish()
    }
}

impl Drop for DispatchHandle {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Contract every solver backend fulfils for the frame pipeline.
///
/// All buffers are indexed by the same particle ordinal as the host
/// [`ParticleStore`].
pub trait SolverFacade: Send {
    fn name(&self) -> &str;

    fn configure(&mut self, params: &SimParams);

    /// Parameters the next dispatch will use.
    fn params(&self) -> SimParams;

    fn upload(&mut self, store: &ParticleStore, scope: UploadScope) -> Result<()>;

    fn upload_shapes(&mut self, shapes: &ShapeBuffers, assets: &AssetRegistry) -> Result<()>;

    /// Starts `substeps` steps of `dt / substeps` each.
    fn dispatch(&mut self, dt: f32, substeps: u32) -> DispatchHandle;

    /// Copies device results into `store`, waiting for in-flight work.
    fn download(&mut self, store: &mut ParticleStore, scope: ReadbackScope);

    fn active_count(&self) -> usize;

    /// Frees device-side collision assets registered by the previous scene.
    fn release_assets(&mut self) {}
}
