use std::path::{Path, PathBuf};
use std::time::Duration;

use stave_core::config::state_dir_at;

pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

pub const DAEMON_SOCKET: &str = "daemon.sock";

pub fn stave_root(home: &Path) -> PathBuf {
    state_dir_at(home)
}

pub fn socket_path(home: &Path) -> PathBuf {
    stave_root(home).join(DAEMON_SOCKET)
}
