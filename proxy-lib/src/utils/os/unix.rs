use std::{io, mem};

use rama::telemetry::tracing;

pub use libc::rlim_t;

fn current_nofile() -> io::Result<libc::rlimit> {
    // SAFETY: getrlimit only writes into the provided, fully owned struct.
    unsafe {
        let mut lim: libc::rlimit = mem::zeroed();
        if libc::getrlimit(libc::RLIMIT_NOFILE, &mut lim) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(lim)
    }
}

/// Raise the soft limit of open file descriptors up to `target`,
/// capped by the hard limit. A soft limit that is already higher is kept.
///
/// Each simulated user of a load run holds its own connection,
/// so the default soft limit of some systems is easily exhausted.
pub fn raise_nofile(target: rlim_t) -> io::Result<()> {
    let mut lim = current_nofile()?;
    let new_soft = target.min(lim.rlim_max);

    if lim.rlim_cur >= new_soft {
        tracing::info!(
            ulimit.current = lim.rlim_cur,
            ulimit.requested = new_soft,
            "ulimit: current soft limit suffices"
        );
        return Ok(());
    }

    let previous = lim.rlim_cur;
    lim.rlim_cur = new_soft;
    // SAFETY: lim is a valid rlimit obtained from getrlimit above.
    if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &lim) } != 0 {
        return Err(io::Error::last_os_error());
    }

    tracing::info!(
        ulimit.previous = previous,
        ulimit.current = new_soft,
        "ulimit: raised soft limit"
    );
    Ok(())
}
