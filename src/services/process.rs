//! Process-tree termination for shell-launched decompilers.
//!
//! The decompiler command runs through `sh -c` / `cmd /C`, which usually spawns
//! a JVM as a grandchild. Killing only the shell leaves the JVM running and holding
//! the output pipes open, so termination always targets the whole tree.

use std::io;
use tokio::process::Command;

/// Put the child in its own process group so the whole tree can be signalled.
pub fn isolate_process_group(cmd: &mut Command) {
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }

    #[cfg(not(unix))]
    {
        let _ = cmd;
    }
}

/// Forcefully kill `pid` and every process it spawned.
///
/// A pid that has already exited is not an error.
pub fn kill_process_tree(pid: u32) -> io::Result<()> {
    tracing::info!("Killing process tree rooted at pid {}", pid);

    #[cfg(unix)]
    {
        let pgid = libc::pid_t::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        // Negative pid targets the process group set up by `isolate_process_group`.
        let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                return Err(err);
            }
            tracing::debug!("Process group {} already gone", pid);
        }
        Ok(())
    }

    #[cfg(windows)]
    {
        // `taskkill /T` terminates the full tree rooted at the pid.
        let status = std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()?;
        if !status.success() {
            tracing::debug!("taskkill exited with {} for pid {}", status, pid);
        }
        Ok(())
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = pid;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "process tree termination is not supported on this platform",
        ))
    }
}
