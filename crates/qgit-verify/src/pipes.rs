//! Raw pipe and FIFO plumbing for feeding the external verifier.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, FromRawFd};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Create an anonymous pipe, returned as `(read, write)`.
///
/// Neither end has close-on-exec set; the read end must stay inheritable so
/// the child can pick it up by number. Callers mark the write end with
/// [`set_cloexec`] so the child does not hold its own stream open.
pub fn pipe_pair() -> io::Result<(File, File)> {
    let mut fds = [0i32; 2];
    // SAFETY: fds points at two writable ints.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: both fds are freshly created and exclusively owned here.
    Ok(unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) })
}

/// Set close-on-exec so `file` is not inherited by spawned children.
pub fn set_cloexec(file: &File) -> io::Result<()> {
    let fd = file.as_raw_fd();
    // SAFETY: fcntl on an fd we own.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Create a FIFO at `path` with owner-only permissions.
pub fn mkfifo(path: &Path) -> io::Result<()> {
    let cpath = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "NUL in FIFO path"))?;
    // SAFETY: cpath is a valid NUL-terminated string.
    if unsafe { libc::mkfifo(cpath.as_ptr(), 0o600) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Open a FIFO for writing without hanging on an absent reader.
///
/// A plain open-for-write on a FIFO blocks until someone opens the read
/// side; if the verifier dies before doing that, the writer thread would
/// hang forever. Instead, open with `O_NONBLOCK` and retry on `ENXIO` until
/// either a reader shows up or `give_up` flips (set once the child has been
/// reaped). On success the descriptor is switched back to blocking mode so
/// the actual writes behave normally.
pub fn open_fifo_writer(path: &Path, give_up: &AtomicBool) -> io::Result<Option<File>> {
    loop {
        match OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
        {
            Ok(file) => {
                set_blocking(&file)?;
                return Ok(Some(file));
            }
            Err(e) if e.raw_os_error() == Some(libc::ENXIO) => {
                if give_up.load(Ordering::Acquire) {
                    return Ok(None);
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(e) => return Err(e),
        }
    }
}

fn set_blocking(file: &File) -> io::Result<()> {
    let fd = file.as_raw_fd();
    // SAFETY: fcntl on an fd we own.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
