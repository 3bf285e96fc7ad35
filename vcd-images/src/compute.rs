//! The workload/compute collaborator boundary.

use vcd_core::Result;

/// Power state of a workload as reported by the compute service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    /// A transitional state; the workload is neither ready nor stopped yet.
    Pending,
    Running,
    Stopped,
}

/// How a container should be brought down before capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndeployMode {
    Shutdown,
    PowerOff,
}

impl UndeployMode {
    pub fn as_str(self) -> &'static str {
        match self {
            UndeployMode::Shutdown => "shutdown",
            UndeployMode::PowerOff => "powerOff",
        }
    }
}

/// A source workload as seen by the capture orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    pub workload_id: String,
    pub state: VmState,
    /// The parent vApp container, when the platform reports one.
    pub vapp_id: Option<String>,
    pub datacenter_id: String,
}

/// The compute service that reports and mutates workload power state.
pub trait ComputeServices: Send + Sync {
    /// Resolves a workload by identifier; `None` when it does not exist.
    fn get_workload(&self, id: &str) -> Result<Option<Workload>>;

    /// Shuts down or powers off a vApp container.
    fn undeploy(&self, vapp_id: &str, mode: UndeployMode) -> Result<()>;

    /// Redeploys (restarts) a vApp container.
    fn deploy(&self, vapp_id: &str) -> Result<()>;
}
