use std::path::{Path, PathBuf};

const DAEMON_FILE_NAME: &str = "tasktrail-daemon";

/// Path of the standalone daemon binary installed next to `cli_path`.
pub fn to_daemon_path(cli_path: &Path) -> PathBuf {
    let mut path = cli_path.to_path_buf();
    path.set_file_name(DAEMON_FILE_NAME);
    #[cfg(windows)]
    {
        path.set_extension("exe");
    }
    path
}
