//! Hydration daemon: trigger sweep + registry watcher + batch workers +
//! socket server, over the local store, dry sources and destination tree.

pub mod deps;
mod error;
pub mod paths;
pub mod pipeline;
pub mod protocol;
pub mod queue;
mod runtime;

pub use deps::LocalDependencies;
pub use error::DaemonError;
pub use pipeline::{run_once, BatchReport, EnqueuedTarget, LocalHydrator, RunSummary};
pub use protocol::{
    request_hydrate, request_status, request_stop, send_request, DaemonRequest, DaemonResponse,
};
pub use queue::HydrationQueue;
pub use runtime::{init_tracing, run, start_blocking, RefreshTimestamps};
