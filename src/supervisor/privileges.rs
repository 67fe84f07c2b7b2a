//! Run the server as an unprivileged account.
//!
//! The container starts as root so volumes can be prepared; the server
//! itself should not be. When root, switch group and user for the whole
//! process before spawning, so the child inherits the reduced identity.

use log::info;

use crate::errors::SupervisorError;

#[cfg(unix)]
pub fn drop_privileges(user: &str) -> Result<(), SupervisorError> {
    use nix::unistd::{getuid, User};

    if !getuid().is_root() {
        info!("Not running as root; keeping current user");
        return Ok(());
    }

    let account = User::from_name(user)
        .map_err(|e| SupervisorError::Privileges(format!("lookup of {} failed: {}", user, e)))?
        .ok_or_else(|| SupervisorError::Privileges(format!("no such user: {}", user)))?;

    switch_ids(&account)?;
    info!(
        "Switched to user {} (uid={}, gid={})",
        user, account.uid, account.gid
    );
    Ok(())
}

#[cfg(target_os = "linux")]
fn switch_ids(account: &nix::unistd::User) -> Result<(), SupervisorError> {
    use nix::unistd::{setgroups, setresgid, setresuid};

    let fail = |what: &str, e: nix::Error| SupervisorError::Privileges(format!("{}: {}", what, e));
    // Group first: once the uid is gone we may no longer change it.
    setgroups(&[account.gid]).map_err(|e| fail("setgroups", e))?;
    setresgid(account.gid, account.gid, account.gid).map_err(|e| fail("setresgid", e))?;
    setresuid(account.uid, account.uid, account.uid).map_err(|e| fail("setresuid", e))?;
    Ok(())
}

#[cfg(all(unix, not(target_os = "linux")))]
fn switch_ids(account: &nix::unistd::User) -> Result<(), SupervisorError> {
    use nix::unistd::{setgid, setuid};

    let fail = |what: &str, e: nix::Error| SupervisorError::Privileges(format!("{}: {}", what, e));
    setgid(account.gid).map_err(|e| fail("setgid", e))?;
    setuid(account.uid).map_err(|e| fail("setuid", e))?;
    Ok(())
}

#[cfg(not(unix))]
pub fn drop_privileges(user: &str) -> Result<(), SupervisorError> {
    info!("Privilege drop to {} not supported on this platform; skipping", user);
    Ok(())
}
