//! Process-level restart.
//!
//! Only used when `restart.mode = "process"`: after a settings save the
//! binary replaces itself with a fresh copy started with the same arguments,
//! so every component comes up from the new settings in a clean process.

use std::process::Command;

/// The command that relaunches this binary with its original arguments.
pub fn restart_command() -> std::io::Result<Command> {
    let exe = std::env::current_exe()?;
    let mut command = Command::new(exe);
    command.args(std::env::args_os().skip(1));
    Ok(command)
}

/// Replace the current process. Only returns if the relaunch failed.
#[cfg(unix)]
pub fn exec_self() -> anyhow::Error {
    use std::os::unix::process::CommandExt;

    tracing::info!("Application restart - settings change");
    match restart_command() {
        Ok(mut command) => anyhow::Error::new(command.exec()).context("re-exec failed"),
        Err(e) => anyhow::Error::new(e).context("cannot locate current executable"),
    }
}

/// Spawn a fresh copy and exit. Only returns if the relaunch failed.
#[cfg(not(unix))]
pub fn exec_self() -> anyhow::Error {
    tracing::info!("Application restart - settings change");
    match restart_command().and_then(|mut command| command.spawn()) {
        Ok(_) => std::process::exit(0),
        Err(e) => anyhow::Error::new(e).context("relaunch failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relaunches_current_exe_with_same_args() {
        let command = restart_command().unwrap();
        assert_eq!(command.get_program(), std::env::current_exe().unwrap().as_os_str());

        let args: Vec<_> = command.get_args().map(ToOwned::to_owned).collect();
        let expected: Vec<_> = std::env::args_os().skip(1).collect();
        assert_eq!(args, expected);
    }
}
