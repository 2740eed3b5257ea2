//! Advisory port locking
//!
//! Only one process should drive a tag at a time. On POSIX hosts this is
//! enforced cooperatively with `flock(2)` on the port's file descriptor,
//! on top of the exclusive open serialport already does for ttys. Elsewhere
//! the lock is a no-op and every acquire succeeds.
//!
//! [`PortGuard`] owns the open connection. Dropping it, or calling
//! [`PortGuard::release`] from a termination path, unlocks and closes the
//! port exactly once.

use crate::error::{Result, TagError};
use crate::serial::{PortConfig, SerialConnection, ShellPort};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Anything a [`PortLock`] can lock: an open file descriptor on unix.
#[cfg(unix)]
pub trait Lockable: std::os::unix::io::AsRawFd {}

#[cfg(unix)]
impl<T: std::os::unix::io::AsRawFd + ?Sized> Lockable for T {}

#[cfg(not(unix))]
pub trait Lockable {}

#[cfg(not(unix))]
impl<T: ?Sized> Lockable for T {}

/// Cross-process exclusion on an open port
pub trait PortLock: Send + Sync {
    fn name(&self) -> &'static str;

    /// Take an exclusive lock without blocking.
    ///
    /// Returns [`TagError::PortBusy`] if another holder exists.
    fn acquire(&self, path: &str, target: &dyn Lockable) -> Result<()>;

    /// Drop the lock. Unlocking a target that is not locked is not an error.
    fn release(&self, path: &str, target: &dyn Lockable) -> Result<()>;
}

/// `flock(LOCK_EX | LOCK_NB)` on the port descriptor
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct FlockLock;

#[cfg(unix)]
impl PortLock for FlockLock {
    fn name(&self) -> &'static str {
        "flock"
    }

    fn acquire(&self, path: &str, target: &dyn Lockable) -> Result<()> {
        // SAFETY: flock only inspects the descriptor, which `target` keeps open
        let rc = unsafe { libc::flock(target.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc == 0 {
            return Ok(());
        }

        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::WouldBlock {
            Err(TagError::PortBusy {
                path: path.to_string(),
            })
        } else {
            Err(TagError::io("Failed to lock serial port", err))
        }
    }

    fn release(&self, _path: &str, target: &dyn Lockable) -> Result<()> {
        // SAFETY: as above
        let rc = unsafe { libc::flock(target.as_raw_fd(), libc::LOCK_UN) };
        if rc == 0 {
            Ok(())
        } else {
            Err(TagError::io(
                "Failed to unlock serial port",
                std::io::Error::last_os_error(),
            ))
        }
    }
}

/// Lock that always succeeds, for platforms without `flock`
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLock;

impl PortLock for NoopLock {
    fn name(&self) -> &'static str {
        "none"
    }

    fn acquire(&self, _path: &str, _target: &dyn Lockable) -> Result<()> {
        Ok(())
    }

    fn release(&self, _path: &str, _target: &dyn Lockable) -> Result<()> {
        Ok(())
    }
}

/// The lock implementation for the host platform
pub fn platform_lock() -> Box<dyn PortLock> {
    #[cfg(unix)]
    {
        Box::new(FlockLock)
    }
    #[cfg(not(unix))]
    {
        Box::new(NoopLock)
    }
}

/// Owns a locked port until released
pub struct PortGuard<C: Lockable = SerialConnection> {
    path: String,
    connection: Option<C>,
    lock: Box<dyn PortLock>,
}

impl<C: Lockable> std::fmt::Debug for PortGuard<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortGuard")
            .field("path", &self.path)
            .field("connected", &self.connection.is_some())
            .finish_non_exhaustive()
    }
}

impl PortGuard<SerialConnection> {
    /// Open the port and lock it with the platform lock.
    ///
    /// serialport claims the tty exclusively while opening it, so a second
    /// process is usually turned away before our own lock runs. Both cases
    /// are reported as [`TagError::PortBusy`].
    pub fn open(config: PortConfig) -> Result<Self> {
        let path = config.port_path.clone();
        let connection = match SerialConnection::open(config) {
            Ok(connection) => connection,
            Err(e) if is_open_contention(&e, &path) => {
                log::debug!("{}: {}", path, e);
                log::error!("Port is busy. Another process is accessing the port.");
                return Err(TagError::PortBusy { path });
            }
            Err(e) => return Err(e),
        };
        Self::acquire(path, connection, platform_lock())
    }
}

/// Whether an open failure means someone else holds an existing port.
///
/// serialport reports both TIOCEXCL's EBUSY and its own lock contention as
/// `NoDevice`, which it also uses for ports that vanished.
fn is_open_contention(err: &TagError, path: &str) -> bool {
    let TagError::Serial(serial) = err else {
        return false;
    };
    let description = serial.description.to_ascii_lowercase();
    let contended = matches!(serial.kind, serialport::ErrorKind::NoDevice)
        || description.contains("busy")
        || description.contains("lock");
    contended && std::path::Path::new(path).exists()
}

impl<C: Lockable> PortGuard<C> {
    /// Lock `connection` and take ownership of it.
    ///
    /// On failure the connection is dropped, which closes it.
    pub fn acquire(path: impl Into<String>, connection: C, lock: Box<dyn PortLock>) -> Result<Self> {
        let path = path.into();
        match lock.acquire(&path, &connection) {
            Ok(()) => {
                log::info!("Port is ready.");
                log::debug!("{} locked with {}", path, lock.name());
                Ok(Self {
                    path,
                    connection: Some(connection),
                    lock,
                })
            }
            Err(e) => {
                if e.is_busy() {
                    log::error!("Port is busy. Another process is accessing the port.");
                } else {
                    log::error!("Failed to lock {}: {}", path, e);
                }
                Err(e)
            }
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_released(&self) -> bool {
        self.connection.is_none()
    }

    /// Access the connection, failing once the guard has been released
    pub fn connection_mut(&mut self) -> Result<&mut C> {
        match self.connection.as_mut() {
            Some(conn) => Ok(conn),
            None => Err(TagError::PortClosed {
                path: self.path.clone(),
            }),
        }
    }

    /// Unlock and close the port. Safe to call more than once.
    pub fn release(&mut self) {
        self.release_with("on exit");
    }

    /// Same as [`release`](Self::release), logged as a signal-driven close
    pub fn release_on_signal(&mut self) {
        self.release_with("on termination signal");
    }

    /// Release on signal once `running` has been cleared by the termination
    /// handler. Returns whether the guard is now released.
    pub fn release_if_stopped(&mut self, running: &AtomicBool) -> bool {
        if running.load(Ordering::SeqCst) {
            return self.is_released();
        }
        self.release_on_signal();
        true
    }

    fn release_with(&mut self, reason: &str) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        if let Err(e) = self.lock.release(&self.path, &connection) {
            log::warn!("{}", e);
        }
        drop(connection);
        log::info!("Serial port {} closed {}", self.path, reason);
    }
}

impl<C: Lockable> Drop for PortGuard<C> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<C: Lockable + ShellPort> ShellPort for PortGuard<C> {
    fn name(&self) -> &str {
        &self.path
    }

    fn bytes_to_read(&mut self) -> Result<u32> {
        self.connection_mut()?.bytes_to_read()
    }

    fn clear_input(&mut self) -> Result<()> {
        self.connection_mut()?.clear_input()
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.connection_mut()?.write_all(data)
    }

    fn read_available(&mut self) -> Result<Vec<u8>> {
        self.connection_mut()?.read_available()
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        self.connection_mut()?.read_line()
    }
}

/// Register SIGINT/SIGTERM handling.
///
/// The returned flag turns false when a signal arrives; loops holding a
/// [`PortGuard`] poll it and call [`PortGuard::release_on_signal`].
pub fn install_termination_handler() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let running_for_signal = Arc::clone(&running);
    ctrlc::set_handler(move || {
        running_for_signal.store(false, Ordering::SeqCst);
    })
    .map_err(|e| {
        TagError::io(
            "Failed to install termination handler",
            std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        )
    })?;
    Ok(running)
}
