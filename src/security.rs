#![forbid(unsafe_code)]

//! Startup guard for the server binary.

use anyhow::{Result, bail};
use nix::unistd::Uid;

/// Refuses to start as root. The server runs an external downloader on
/// arbitrary user-supplied URLs and deletes files on a timer, neither of
/// which should happen with root privileges.
pub fn ensure_not_root(process: &str) -> Result<()> {
    ensure_not_root_for(Uid::current(), process)
}

fn ensure_not_root_for(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        bail!("{process} must not be run as root; start it as an unprivileged service account");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unprivileged_uid_is_allowed() {
        assert!(ensure_not_root_for(Uid::from_raw(1000), "tubedrop").is_ok());
    }

    #[test]
    fn root_uid_is_rejected() {
        let err = ensure_not_root_for(Uid::from_raw(0), "tubedrop").unwrap_err();
        assert!(err.to_string().contains("must not be run as root"));
    }
}
