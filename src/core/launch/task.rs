// ─── Launch Task ───
// Starts the runtime as a detached process with a prepared environment.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use tracing::{debug, info};

use crate::core::error::{InstallerError, InstallerResult};

/// Spawn `executable` detached from this process and return its pid.
///
/// Does not wait for the child. The environment is replaced wholesale by `env`.
pub fn spawn_detached(
    executable: &Path,
    args: &[String],
    env: Vec<(OsString, OsString)>,
) -> InstallerResult<Option<u32>> {
    let mut std_cmd = std::process::Command::new(executable);
    std_cmd
        .args(args)
        .env_clear()
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    configure_platform_spawn(&mut std_cmd);

    let mut cmd = tokio::process::Command::from(std_cmd);
    cmd.kill_on_drop(false);

    info!("Launching runtime: {:?}", executable);
    debug!("Command (copy/paste): {}", format_command_for_logs(executable, args));

    let child = cmd.spawn().map_err(|source| InstallerError::Spawn {
        program: executable.to_path_buf(),
        source,
    })?;

    // Dropping the handle leaves the process running; tokio reaps it on exit.
    Ok(child.id())
}

fn configure_platform_spawn(cmd: &mut std::process::Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // New session: no controlling terminal, and hangups or signals sent to our
        // process group do not reach the runtime.
        // SAFETY: setsid is async-signal-safe and touches no state shared with the parent.
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const DETACHED_PROCESS: u32 = 0x00000008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
        cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }
}

fn format_command_for_logs(executable: &Path, args: &[String]) -> String {
    let program = shell_escape(&executable.to_string_lossy());
    let args = args
        .iter()
        .map(|arg| shell_escape(arg))
        .collect::<Vec<_>>()
        .join(" ");

    if args.is_empty() {
        program
    } else {
        format!("{} {}", program, args)
    }
}

fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }

    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=')
    }) {
        return raw.to_string();
    }

    format!("\"{}\"", raw.replace('"', "\\\""))
}
