use std::{
    env,
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::{anyhow, Result};
use sysinfo::{get_current_pid, Signal, System};
use tracing::info;

use crate::daemon::config::TrackerArgs;

/// Terminates every other process started from one of `executables`.
pub fn kill_previous_servers(executables: &[PathBuf]) -> Result<usize> {
    let system = System::new_all();
    let current_id = get_current_pid().map_err(|e| anyhow!("Can't read own pid: {e}"))?;
    let mut killed = 0;
    for (pid, process) in system.processes().iter() {
        if *pid == current_id {
            continue;
        }
        if matches!(process.parent(), Some(p) if p == current_id) {
            continue;
        }

        if process
            .exe()
            .filter(|v| v.exists())
            .filter(|v| executables.iter().any(|name| name == v))
            .is_some()
        {
            info!("Stopping tracker process {pid}");
            // This will forcefully terminate the process on Windows. Anything better will require a
            // lot more work.
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
            process.wait();
            killed += 1;
        }
    }
    Ok(killed)
}

/// Shuts down running trackers and starts a new one serving `app_dir` in a detached process.
pub fn restart_server(executables: &[PathBuf], app_dir: &Path, tracker: &TrackerArgs) -> Result<()> {
    let process_name = env::current_exe()?;
    kill_previous_servers(executables)?;

    let mut command = std::process::Command::new(process_name);
    command.arg("serve").arg("--dir").arg(app_dir);
    command.args(tracker.to_command_line());
    // Keys given on the command line reach the child through its environment only.
    if let Some(key) = &tracker.api_key {
        command.env("OPENAI_API_KEY", key);
    }
    if let Some(key) = &tracker.azure_api_key {
        command.env("AZURE_OPENAI_API_KEY", key);
    }

    #[cfg(feature = "win")]
    {
        use std::os::windows::process::CommandExt;
        use windows::Win32::System::Threading::DETACHED_PROCESS;
        command.creation_flags(DETACHED_PROCESS.0);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
        command.stdin(Stdio::null());
        command.stdout(Stdio::null());
    }

    println!("Spawning");
    #[allow(clippy::zombie_processes)]
    let _ = command.spawn()?;
    println!("Success");
    Ok(())
}
