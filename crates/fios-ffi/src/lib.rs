//! # fios-ffi - C-compatible bindings
//!
//! A stable C ABI over the FIOS session API so that C programs, Python
//! (ctypes/cffi) and other FFI hosts can drive serial file transfers.
//!
//! ## Usage from C
//!
//! ```c
//! fios_init();
//! FiosSerial *port = fios_serial_open("/dev/ttyACM0");
//! FiosFile *f = fios_file_send(port, "firmware.bin");
//! float progress = 0.0f;
//! while (fios_file_idle(f, &progress) == FIOS_STATUS_IN_PROGRESS) {
//!     usleep(1000);
//! }
//! if (fios_file_idle(f, NULL) == FIOS_STATUS_ERROR) {
//!     fprintf(stderr, "%s\n", fios_file_get_last_error(f));
//! }
//! fios_file_close(f);
//! fios_serial_close(port);
//! ```
//!
//! ## Safety
//!
//! - Every handle is owned by Rust and must be released with its `*_close`
//!   function exactly once.
//! - A serial handle must outlive every file handle created from it, and
//!   must not be used by two file handles at the same time.
//! - NULL is accepted everywhere: functions given a NULL handle return NULL,
//!   `FIOS_STATUS_ERROR`, `0.0` or `"no error"` instead of touching memory.
//! - Strings are null-terminated; paths must be valid UTF-8.

// FFI code inherently requires unsafe operations within unsafe functions
#![allow(unsafe_op_in_unsafe_fn)]

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr::{self, NonNull};

use fios_core::{Session, SessionBuilder};
use fios_transport::{SerialConfig, SerialPort, Transport, TransportResult, TransportStats};

/// Status: the transfer failed
pub const FIOS_STATUS_ERROR: c_int = 0;
/// Status: work remains, keep calling `fios_file_idle`
pub const FIOS_STATUS_IN_PROGRESS: c_int = 1;
/// Status: the file was transferred
pub const FIOS_STATUS_COMPLETED: c_int = 2;

const NO_ERROR: &CStr = c"no error";

/// Opaque handle to an open serial device
pub struct FiosSerial {
    port: Box<dyn Transport>,
}

/// Opaque handle to one file transfer
pub struct FiosFile {
    session: Session<PortRef>,
    last_error: Option<CString>,
}

/// Borrowed view of the transport inside a [`FiosSerial`].
///
/// The C caller guarantees the serial handle outlives the file handle and is
/// not shared between live transfers.
#[derive(Debug)]
struct PortRef(NonNull<FiosSerial>);

impl PortRef {
    fn port(&mut self) -> &mut dyn Transport {
        // SAFETY: the pointer came from a live FiosSerial (see type docs).
        unsafe { &mut *self.0.as_mut().port }
    }
}

impl Transport for PortRef {
    fn read(&mut self, buf: &mut [u8]) -> TransportResult<usize> {
        self.port().read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> TransportResult<usize> {
        self.port().write(buf)
    }

    fn stats(&self) -> TransportStats {
        // SAFETY: as above; shared access only.
        unsafe { self.0.as_ref().port.stats() }
    }
}

impl std::fmt::Debug for FiosSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FiosSerial")
            .field("stats", &self.port.stats())
            .finish()
    }
}

impl FiosSerial {
    fn new(port: Box<dyn Transport>) -> *mut Self {
        Box::into_raw(Box::new(Self { port }))
    }
}

/// Initialize logging for the library
///
/// Installs a `tracing` subscriber honoring `RUST_LOG` (default `info`).
/// Returns 0. Calling it again, or when the host already installed a
/// subscriber, is harmless.
#[unsafe(no_mangle)]
pub extern "C" fn fios_init() -> c_int {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    0
}

/// Library version as a static null-terminated string
///
/// The caller must not free the returned pointer.
#[unsafe(no_mangle)]
pub extern "C" fn fios_version() -> *const c_char {
    const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr().cast()
}

/// Open a serial device in raw mode at the default speed
///
/// `"auto"` selects the platform default device. Returns NULL on failure;
/// the reason is logged.
///
/// # Safety
///
/// `devpath` must be NULL or a valid null-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fios_serial_open(devpath: *const c_char) -> *mut FiosSerial {
    let Some(devpath) = from_c_str(devpath) else {
        tracing::error!("fios_serial_open: device path is NULL or not UTF-8");
        return ptr::null_mut();
    };

    let device = fios_transport::resolve_device(devpath);
    match SerialPort::open(&device, &SerialConfig::default()) {
        Ok(port) => FiosSerial::new(Box::new(port)),
        Err(e) => {
            tracing::error!("fios_serial_open: {}", e);
            ptr::null_mut()
        }
    }
}

/// Close a serial device
///
/// # Safety
///
/// `s` must be NULL or a handle from `fios_serial_open` that has not been
/// closed, and no file handle created from it may still be in use.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fios_serial_close(s: *mut FiosSerial) {
    if !s.is_null() {
        drop(Box::from_raw(s));
    }
}

/// Start sending the file at `path` over `s`
///
/// Returns NULL if either argument is NULL or the file cannot be opened.
///
/// # Safety
///
/// `s` must be NULL or a live serial handle; `path` must be NULL or a valid
/// null-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fios_file_send(s: *mut FiosSerial, path: *const c_char) -> *mut FiosFile {
    open_file(s, path, Mode::Send)
}

/// Start receiving a file over `s` into `path` (created or truncated)
///
/// Returns NULL if either argument is NULL or the file cannot be created.
///
/// # Safety
///
/// Same as [`fios_file_send`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fios_file_receive(
    s: *mut FiosSerial,
    path: *const c_char,
) -> *mut FiosFile {
    open_file(s, path, Mode::Receive)
}

#[derive(Clone, Copy)]
enum Mode {
    Send,
    Receive,
}

unsafe fn open_file(s: *mut FiosSerial, path: *const c_char, mode: Mode) -> *mut FiosFile {
    let Some(serial) = NonNull::new(s) else {
        tracing::error!("fios_file: serial handle is NULL");
        return ptr::null_mut();
    };
    let Some(path) = from_c_str(path) else {
        tracing::error!("fios_file: path is NULL or not UTF-8");
        return ptr::null_mut();
    };

    let builder = SessionBuilder::new();
    let opened = match mode {
        Mode::Send => builder.send(PortRef(serial), path),
        Mode::Receive => builder.receive(PortRef(serial), path),
    };

    match opened {
        Ok(session) => Box::into_raw(Box::new(FiosFile {
            session,
            last_error: None,
        })),
        Err(e) => {
            tracing::error!("fios_file: cannot open {}: {}", path, e);
            ptr::null_mut()
        }
    }
}

/// Advance the transfer without blocking
///
/// Returns `FIOS_STATUS_IN_PROGRESS` while work remains, otherwise
/// `FIOS_STATUS_COMPLETED` or `FIOS_STATUS_ERROR`. When `progress` is not
/// NULL the current progress (0.0 to 1.0) is written to it.
///
/// # Safety
///
/// `f` must be NULL or a live file handle; `progress` must be NULL or valid
/// for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fios_file_idle(f: *mut FiosFile, progress: *mut f32) -> c_int {
    let Some(file) = f.as_mut() else {
        return FIOS_STATUS_ERROR;
    };

    let _ = match progress.as_mut() {
        Some(out) => file.session.idle_with_progress(out),
        None => file.session.idle(),
    };
    file.session.status().code()
}

/// Current progress between 0.0 and 1.0 (0.0 for NULL)
///
/// # Safety
///
/// `f` must be NULL or a live file handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fios_file_get_progress(f: *const FiosFile) -> f32 {
    f.as_ref().map_or(0.0, |file| file.session.progress())
}

/// Description of the error that ended the transfer, or `"no error"`
///
/// The string is owned by the handle and stays valid until the next call
/// on it or until `fios_file_close`.
///
/// # Safety
///
/// `f` must be NULL or a live file handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fios_file_get_last_error(f: *mut FiosFile) -> *const c_char {
    let Some(file) = f.as_mut() else {
        return NO_ERROR.as_ptr();
    };
    let Some(error) = file.session.last_error() else {
        return NO_ERROR.as_ptr();
    };

    // Display output never contains NUL, but strip it rather than fail.
    let text = error.to_string().replace('\0', " ");
    let text = file.last_error.insert(CString::new(text).unwrap_or_default());
    text.as_ptr()
}

/// Release a file handle; an unfinished transfer is cancelled
///
/// The serial handle is left open.
///
/// # Safety
///
/// `f` must be NULL or a handle that has not been closed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fios_file_close(f: *mut FiosFile) {
    if !f.is_null() {
        let mut file = Box::from_raw(f);
        file.session.close();
    }
}

unsafe fn from_c_str<'a>(s: *const c_char) -> Option<&'a str> {
    if s.is_null() {
        None
    } else {
        CStr::from_ptr(s).to_str().ok()
    }
}
