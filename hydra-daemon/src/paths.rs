use std::path::{Path, PathBuf};
use std::time::Duration;

pub use hydra_core::store::{hydra_root, projects_root};

pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);
pub const DAEMON_SOCKET: &str = "hydra.sock";
pub const PROJECT_INDEX: &str = "project.yaml";

pub fn socket_path(home: &Path) -> PathBuf {
    hydra_root(home).join(DAEMON_SOCKET)
}
