use log::{debug, info};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Failed to load library {path}: {reason}")]
    Load { path: String, reason: String },
    #[error("Symbol {name} not found: {reason}")]
    Symbol { name: String, reason: String },
    #[error("Invalid name {0:?} (contains an interior NUL)")]
    InvalidName(String),
    #[error("Dynamic library loading is not supported on this target")]
    Unsupported,
}

/// A dynamically loaded shared library. Unloaded on drop.
#[derive(Debug)]
pub struct Library {
    handle: *mut std::ffi::c_void,
    path: String,
}

// SAFETY: dlopen handles are process-wide and usable from any thread.
unsafe impl Send for Library {}
unsafe impl Sync for Library {}

impl Library {
    #[cfg(unix)]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LibraryError> {
        let path = path.as_ref().to_string_lossy().into_owned();
        let c_path = std::ffi::CString::new(path.clone()).map_err(|_| LibraryError::InvalidName(path.clone()))?;

        // SAFETY: c_path is a valid NUL-terminated string for the call.
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if handle.is_null() {
            return Err(LibraryError::Load { path, reason: last_dl_error() });
        }
        info!("Loaded library {}", path);
        Ok(Self { handle, path })
    }

    #[cfg(not(unix))]
    pub fn load(_path: impl AsRef<Path>) -> Result<Self, LibraryError> {
        Err(LibraryError::Unsupported)
    }

    /// Looks up `name` and reinterprets it as `T`.
    ///
    /// # Safety
    /// `T` must be a pointer-sized type (normally an `extern "C" fn`) that
    /// matches the symbol's real signature, and the value must not be used
    /// after the library is dropped.
    #[cfg(unix)]
    pub unsafe fn symbol<T: Copy>(&self, name: &str) -> Result<T, LibraryError> {
        let () = PointerSized::<T>::CHECK;
        let c_name = std::ffi::CString::new(name).map_err(|_| LibraryError::InvalidName(name.to_string()))?;

        // Clear any stale error so a NULL symbol can be told apart from a miss.
        libc::dlerror();
        let sym = libc::dlsym(self.handle, c_name.as_ptr());
        if sym.is_null() {
            return Err(LibraryError::Symbol { name: name.to_string(), reason: last_dl_error() });
        }
        debug!("Resolved {} in {}", name, self.path);
        Ok(std::mem::transmute_copy(&sym))
    }

    #[cfg(not(unix))]
    pub unsafe fn symbol<T: Copy>(&self, _name: &str) -> Result<T, LibraryError> {
        Err(LibraryError::Unsupported)
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[cfg(unix)]
impl Drop for Library {
    fn drop(&mut self) {
        // SAFETY: handle came from a successful dlopen and is closed once.
        if unsafe { libc::dlclose(self.handle) } != 0 {
            log::warn!("dlclose({}) failed: {}", self.path, last_dl_error());
        } else {
            debug!("Unloaded library {}", self.path);
        }
    }
}

/// Rejects non-pointer-sized symbol types when `symbol::<T>` is instantiated.
#[cfg(unix)]
struct PointerSized<T>(std::marker::PhantomData<T>);

#[cfg(unix)]
impl<T> PointerSized<T> {
    const CHECK: () = assert!(
        std::mem::size_of::<T>() == std::mem::size_of::<*mut std::ffi::c_void>(),
        "symbol type must be pointer-sized"
    );
}

#[cfg(unix)]
fn last_dl_error() -> String {
    // SAFETY: dlerror returns NULL or a valid C string owned by libc.
    let msg = unsafe { libc::dlerror() };
    if msg.is_null() {
        "unknown error".to_string()
    } else {
        unsafe { std::ffi::CStr::from_ptr(msg) }.to_string_lossy().into_owned()
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn test_missing_library_is_an_error() {
        match Library::load("/nonexistent/libkeel_missing.so") {
            Err(LibraryError::Load { path, .. }) => assert!(path.contains("libkeel_missing")),
            other => panic!("expected Load error, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_libm_symbol() {
        let lib = match Library::load("libm.so.6") {
            Ok(lib) => lib,
            // Not every test image ships glibc's libm under that soname.
            Err(_) => return,
        };
        let cos: extern "C" fn(f64) -> f64 = unsafe { lib.symbol("cos") }.unwrap();
        assert!((cos(0.0) - 1.0).abs() < 1e-12);
        assert!(matches!(unsafe { lib.symbol::<extern "C" fn()>("keel_no_such_symbol") }, Err(LibraryError::Symbol { .. })));
    }
}
