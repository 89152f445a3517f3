//! Values crossing the boundary
//!
//! ## Memory Layout
//!
//! ```text
//! NativeValue<T> (repr C)
//!   value ──────────→ host object (opaque to the foreign side)
//!   method_pointer ─→ T: { version: f64, fn ptrs... }   (static)
//!                        ↑ version always at offset 0
//! ```

use events::native::{
    EventMethods, ExceptionMethods, EVENT_METHODS_VERSION, EXCEPTION_METHODS_VERSION,
};
use std::ffi::{c_double, c_void};
use std::ptr;

use crate::error::{BridgeError, Result};

/// A `repr(C)` function table whose first field is its `version`.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` with a `c_double` version as the
/// first field.
pub unsafe trait MethodTable {
    const VERSION: c_double;
}

unsafe impl MethodTable for EventMethods {
    const VERSION: c_double = EVENT_METHODS_VERSION;
}

unsafe impl MethodTable for ExceptionMethods {
    const VERSION: c_double = EXCEPTION_METHODS_VERSION;
}

/// Host object paired with the table that operates on it.
#[repr(C)]
pub struct NativeValue<T> {
    pub value: *const c_void,
    pub method_pointer: *const T,
}

impl<T> NativeValue<T> {
    pub fn new(value: *const c_void, method_pointer: *const T) -> Self {
        Self {
            value,
            method_pointer,
        }
    }

    pub fn null() -> Self {
        Self::new(ptr::null(), ptr::null())
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }
}

/// Read the version tag of any table without knowing its layout.
///
/// # Safety
///
/// `table` must be null or point to a live `T`.
pub unsafe fn table_version<T: MethodTable>(table: *const T) -> Result<c_double> {
    if table.is_null() {
        return Err(BridgeError::NullPointer("method table"));
    }
    Ok(*(table as *const c_double))
}

/// Borrow a table after checking it was built for this ABI version.
///
/// # Safety
///
/// `table` must be null or point to a live `T` for `'a`.
pub unsafe fn checked_table<'a, T: MethodTable>(table: *const T) -> Result<&'a T> {
    let actual = table_version(table)?;
    if actual != T::VERSION {
        return Err(BridgeError::VersionMismatch {
            expected: T::VERSION,
            actual,
        });
    }
    Ok(&*table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use events::native::{EVENT_METHODS, EXCEPTION_METHODS};

    #[test]
    fn test_static_tables_pass_version_check() {
        assert!(unsafe { checked_table(&EVENT_METHODS as *const EventMethods) }.is_ok());
        assert!(unsafe { checked_table(&EXCEPTION_METHODS as *const ExceptionMethods) }.is_ok());
    }

    #[test]
    fn test_version_drift_is_detected() {
        let drifted = ExceptionMethods {
            version: 2.0,
            ..EXCEPTION_METHODS
        };
        let Err(err) = (unsafe { checked_table(&drifted as *const ExceptionMethods) }) else {
            panic!("drifted table accepted");
        };
        assert!(matches!(
            err,
            BridgeError::VersionMismatch {
                expected,
                actual
            } if expected == 1.0 && actual == 2.0
        ));

        let null: *const ExceptionMethods = ptr::null();
        assert!(matches!(
            unsafe { checked_table(null) },
            Err(BridgeError::NullPointer(_))
        ));
    }

    #[test]
    fn test_null_value() {
        let value: NativeValue<EventMethods> = NativeValue::null();
        assert!(value.is_null());
    }
}
