//! POSIX serial port transport.
//!
//! Opens a tty device in raw 8N1 mode with no flow control and no line
//! discipline processing, so every byte written by the peer reaches the
//! protocol engine untouched. The descriptor is non-blocking with
//! `VMIN = 0, VTIME = 0`: a read with nothing queued returns immediately.
//!
//! Only Unix is supported; elsewhere [`SerialPort::open`] reports
//! [`TransportError::Unsupported`].

use std::fs::File;
use std::io::{self, Read, Write};

use crate::transport::{Transport, TransportError, TransportResult, TransportStats};
use crate::{AUTO_DEVICE, DEFAULT_BAUD_RATE};

/// Line speeds accepted by [`SerialConfig`]
pub const SUPPORTED_BAUD_RATES: &[u32] = &[9_600, 19_200, 38_400, 57_600, 115_200, 230_400];

/// Serial line configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Line speed in bits per second
    pub baud_rate: u32,
    /// Discard stale bytes in both kernel queues after opening
    pub flush_on_open: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            flush_on_open: true,
        }
    }
}

impl SerialConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `TransportError::InvalidConfig` for an unsupported baud rate.
    pub fn validate(&self) -> TransportResult<()> {
        if SUPPORTED_BAUD_RATES.contains(&self.baud_rate) {
            Ok(())
        } else {
            Err(TransportError::InvalidConfig(format!(
                "unsupported baud rate {} (supported: {:?})",
                self.baud_rate, SUPPORTED_BAUD_RATES
            )))
        }
    }
}

/// Resolve a device argument, mapping `"auto"` to the platform default.
///
/// USB gadget boards (aarch64) expose the link as `/dev/ttyGS0`, a desktop
/// host sees the same link as `/dev/ttyACM0`, and Windows hosts as `COM5`.
///
/// # Examples
///
/// ```
/// use fios_transport::resolve_device;
///
/// assert_eq!(resolve_device("/dev/ttyUSB1"), "/dev/ttyUSB1");
/// assert!(!resolve_device("auto").is_empty());
/// ```
#[must_use]
pub fn resolve_device(device: &str) -> String {
    if device != AUTO_DEVICE {
        return device.to_string();
    }

    let default = if cfg!(windows) {
        "COM5"
    } else if cfg!(target_arch = "aarch64") {
        "/dev/ttyGS0"
    } else {
        "/dev/ttyACM0"
    };

    default.to_string()
}

/// Raw-mode serial port
#[derive(Debug)]
pub struct SerialPort {
    file: File,
    path: String,
    stats: TransportStats,
}

impl SerialPort {
    /// Open and configure the serial device at `path`
    ///
    /// # Errors
    ///
    /// Returns `TransportError::InvalidConfig` for a bad configuration,
    /// `TransportError::OpenFailed` if the device cannot be opened, and
    /// `TransportError::Io` if the line settings cannot be applied.
    #[cfg(unix)]
    pub fn open(path: &str, config: &SerialConfig) -> TransportResult<Self> {
        use std::fs::OpenOptions;
        use std::os::unix::fs::OpenOptionsExt;
        use std::os::unix::io::AsRawFd;

        config.validate()?;
        let speed = termios::speed(config.baud_rate)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(path)
            .map_err(|source| TransportError::OpenFailed {
                path: path.to_string(),
                source,
            })?;

        termios::make_raw(file.as_raw_fd(), speed, config.flush_on_open)?;

        tracing::info!("Opened serial port {} at {} baud", path, config.baud_rate);

        Ok(Self {
            file,
            path: path.to_string(),
            stats: TransportStats::new(),
        })
    }

    /// Open and configure the serial device at `path`
    ///
    /// # Errors
    ///
    /// Always returns `TransportError::Unsupported` on this platform.
    #[cfg(not(unix))]
    pub fn open(path: &str, config: &SerialConfig) -> TransportResult<Self> {
        config.validate()?;
        tracing::error!("Serial port {} requested on an unsupported platform", path);
        Err(TransportError::Unsupported("serial ports require a Unix host"))
    }

    /// Device path this port was opened from
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Transport for SerialPort {
    fn read(&mut self, buf: &mut [u8]) -> TransportResult<usize> {
        // A raw tty with VMIN = 0 reports "no data" as 0, not as end of file.
        let n = match self.file.read(buf) {
            Ok(n) => n,
            Err(e) if would_block(&e) => 0,
            Err(e) => return Err(TransportError::Io(e)),
        };

        self.stats.record_read(n);
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> TransportResult<usize> {
        let n = match self.file.write(buf) {
            Ok(n) => n,
            Err(e) if would_block(&e) => 0,
            Err(e) => return Err(TransportError::Io(e)),
        };

        self.stats.record_write(n);
        Ok(n)
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}

fn would_block(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

#[cfg(unix)]
mod termios {
    use std::io;
    use std::os::unix::io::RawFd;

    use crate::transport::{TransportError, TransportResult};

    pub(super) fn speed(baud_rate: u32) -> TransportResult<libc::speed_t> {
        let speed = match baud_rate {
            9_600 => libc::B9600,
            19_200 => libc::B19200,
            38_400 => libc::B38400,
            57_600 => libc::B57600,
            115_200 => libc::B115200,
            230_400 => libc::B230400,
            other => {
                return Err(TransportError::InvalidConfig(format!(
                    "unsupported baud rate {other}"
                )));
            }
        };
        Ok(speed)
    }

    fn check(ret: libc::c_int) -> io::Result<()> {
        if ret == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    /// Put the tty behind `fd` into raw 8N1 mode at `speed`.
    pub(super) fn make_raw(fd: RawFd, speed: libc::speed_t, flush: bool) -> io::Result<()> {
        // SAFETY: `fd` is an open descriptor owned by the caller for the
        // duration of this call, and `options` is fully initialised by
        // `tcgetattr` before any field is read.
        unsafe {
            let mut options: libc::termios = std::mem::zeroed();
            check(libc::tcgetattr(fd, &mut options))?;

            libc::cfmakeraw(&mut options);

            options.c_cflag &= !(libc::CSIZE | libc::CSTOPB | libc::PARENB | libc::CRTSCTS);
            options.c_cflag |= libc::CS8 | libc::CREAD | libc::CLOCAL;
            options.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);
            options.c_iflag |= libc::IGNPAR;

            options.c_cc[libc::VMIN] = 0;
            options.c_cc[libc::VTIME] = 0;

            check(libc::cfsetispeed(&mut options, speed))?;
            check(libc::cfsetospeed(&mut options, speed))?;
            check(libc::tcsetattr(fd, libc::TCSANOW, &options))?;

            if flush {
                check(libc::tcflush(fd, libc::TCIOFLUSH))?;
            }
        }

        Ok(())
    }
}
