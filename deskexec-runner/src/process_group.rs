//! Session and process-group plumbing for launched commands.
//!
//! Each command is made the leader of a new session in `pre_exec`, so its
//! pid doubles as the id of a group holding everything it forks. Stopping a
//! command means signalling that group.
//!
//! On non-Unix targets every call is a no-op.

use std::io;

/// Signals the launcher sends to a command's group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KillSignal {
    /// SIGTERM, the polite request used for cancel and timeout.
    #[default]
    Term,
    /// SIGKILL, sent once the grace period runs out.
    Kill,
}

#[cfg(unix)]
impl KillSignal {
    fn raw(self) -> libc::c_int {
        match self {
            KillSignal::Term => libc::SIGTERM,
            KillSignal::Kill => libc::SIGKILL,
        }
    }
}

/// Process group led by a launched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessGroup {
    id: u32,
}

impl ProcessGroup {
    pub fn new(id: u32) -> Self {
        Self { id }
    }

    pub fn id(self) -> u32 {
        self.id
    }

    /// Deliver `signal` to every member. A group that has already exited
    /// counts as success; groups 0 and 1 are never signalled.
    #[cfg(unix)]
    #[allow(unsafe_code)]
    pub fn signal(self, signal: KillSignal) -> io::Result<()> {
        let pgid = self.pgid()?;
        if unsafe { libc::killpg(pgid, signal.raw()) } == 0 {
            return Ok(());
        }
        match io::Error::last_os_error() {
            err if err.raw_os_error() == Some(libc::ESRCH) => Ok(()),
            err => Err(err),
        }
    }

    #[cfg(not(unix))]
    pub fn signal(self, _signal: KillSignal) -> io::Result<()> {
        Ok(())
    }

    /// Whether any member is still running.
    #[cfg(unix)]
    #[allow(unsafe_code)]
    pub fn is_alive(self) -> bool {
        let Ok(pgid) = self.pgid() else {
            return false;
        };
        let status = unsafe { libc::killpg(pgid, 0) };
        // EPERM: the group exists but belongs to another user.
        status == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    #[cfg(not(unix))]
    pub fn is_alive(self) -> bool {
        false
    }

    #[cfg(unix)]
    fn pgid(self) -> io::Result<libc::pid_t> {
        match libc::pid_t::try_from(self.id) {
            Ok(pgid) if pgid > 1 => Ok(pgid),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing to signal process group {}", self.id),
            )),
        }
    }
}

/// Runs inside the forked child before `exec`.
///
/// Moves the child into a session of its own and, on Linux, asks the kernel
/// to SIGTERM it when `parent_pid` goes away.
#[cfg(unix)]
#[allow(unsafe_code)]
pub fn isolate_child(parent_pid: libc::pid_t) -> io::Result<()> {
    if unsafe { libc::setsid() } == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EPERM) {
            return Err(err);
        }
        // Already a session leader; a fresh group is the best we can do.
        if unsafe { libc::setpgid(0, 0) } == -1 {
            return Err(io::Error::last_os_error());
        }
    }

    #[cfg(target_os = "linux")]
    {
        if unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) } == -1 {
            return Err(io::Error::last_os_error());
        }
        if unsafe { libc::getppid() } != parent_pid {
            unsafe { libc::raise(libc::SIGTERM) };
        }
    }
    #[cfg(not(target_os = "linux"))]
    let _ = parent_pid;

    Ok(())
}
