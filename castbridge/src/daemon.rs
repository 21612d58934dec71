//! Background mode: the process re-spawns itself detached and the parent exits.

use std::process::{Command, Stdio};

use anyhow::{Context, Result};

/// Set in the environment of the detached child.
pub const DAEMON_ENV: &str = "CASTBRIDGE_DAEMONIZED";

pub fn is_daemonized() -> bool {
    std::env::var_os(DAEMON_ENV).is_some()
}

/// Starts a detached copy of this process with the same arguments.
#[cfg(unix)]
pub fn daemonize() -> Result<u32> {
    use std::os::unix::process::CommandExt;

    let exe = std::env::current_exe().context("Cannot locate the running executable")?;
    let mut command = Command::new(exe);
    command
        .args(std::env::args_os().skip(1))
        .env(DAEMON_ENV, "1")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    // SAFETY: setsid is async-signal-safe and touches no parent state.
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = command.spawn().context("Failed to start the daemon")?;
    Ok(child.id())
}

#[cfg(not(unix))]
pub fn daemonize() -> Result<u32> {
    anyhow::bail!("Daemon mode is only supported on unix")
}
