//! Two-value status codes.

use std::fmt;

use databus_common::Result;

/// Binary outcome of a bus operation: `Ok` (0) or `Err` (-1).
///
/// The rich [`Error`](databus_common::Error) is logged when a result is
/// collapsed into a status; callers that need it should use [`DataBus`](crate::DataBus).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    Err = -1,
}

impl Status {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }

    /// Collapse `result`, logging the error at `error` level.
    pub fn from_result<T>(operation: &'static str, result: Result<T>) -> Self {
        match result {
            Ok(_) => Status::Ok,
            Err(e) => {
                tracing::error!(operation, kind = ?e.kind(), error = %e, "Bus operation failed");
                Status::Err
            }
        }
    }
}

impl From<Status> for i32 {
    fn from(status: Status) -> Self {
        status.code()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::Err => write!(f, "ERR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use databus_common::Error;

    #[test]
    fn test_codes() {
        assert_eq!(Status::Ok.code(), 0);
        assert_eq!(i32::from(Status::Err), -1);
        assert_eq!(Status::Err.to_string(), "ERR");
    }

    #[test]
    fn test_from_result() {
        assert_eq!(Status::from_result("publish", Ok(())), Status::Ok);
        assert_eq!(
            Status::from_result::<()>("publish", Err(Error::ContextDestroyed)),
            Status::Err
        );
    }
}
