use std::{process::ExitStatus, time::Duration};

#[cfg(target_family = "unix")]
use ranger_core::executor::signal_exit_code;
use ranger_core::executor::SPAWN_FAILURE_EXIT_CODE;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{Child, Command},
};

/// Command running `script` through the platform shell.
pub fn shell_command(script: &str) -> Command {
    cfg_if::cfg_if! {
        if #[cfg(target_family = "windows")] {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(script);
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(script);
            cmd.process_group(0);
        }
    }
    cmd.kill_on_drop(true);
    cmd
}

/// Exit code of `status`; signal terminations map to `128 + signal`.
#[cfg(target_family = "unix")]
pub fn exit_code(status: &ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(signal_exit_code))
        .unwrap_or(SPAWN_FAILURE_EXIT_CODE)
}

#[cfg(target_family = "windows")]
pub fn exit_code(status: &ExitStatus) -> i32 {
    status.code().unwrap_or(SPAWN_FAILURE_EXIT_CODE)
}

/// Drain `reader` to the end, keeping whatever arrived before an error.
pub async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut r) = reader {
        let _ = r.read_to_end(&mut buf).await;
    }
    buf
}

pub fn elapsed_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(target_family = "unix")]
fn signal_group(pgid: u32, signal: libc::c_int) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions.
    unsafe {
        libc::kill(-pgid, signal);
    }
}

/// SIGKILL every process in group `pgid`, including ones that outlived the leader.
#[cfg(target_family = "unix")]
pub fn kill_group(pgid: u32) {
    signal_group(pgid, libc::SIGKILL);
}

#[cfg(target_family = "windows")]
pub fn kill_group(_pgid: u32) {}

/// SIGTERM the child's process group, then SIGKILL after `grace`.
#[cfg(target_family = "unix")]
pub async fn kill_graceful(child: &mut Child, grace: Duration) -> std::io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };
    signal_group(pid, libc::SIGTERM);
    let exited = tokio::time::timeout(grace, child.wait()).await.is_ok();
    // Stragglers that ignored SIGTERM or outlived the leader.
    kill_group(pid);
    if exited { Ok(()) } else { child.kill().await }
}

#[cfg(target_family = "windows")]
pub async fn kill_graceful(child: &mut Child, _grace: Duration) -> std::io::Result<()> {
    child.kill().await
}
