use std::fmt;

/// Possible errors returned by operations on a FIB or its RIB.
///
/// All errors are surfaced to the caller unmodified; the store performs no
/// logging, retry or recovery of its own. Internal consistency violations
/// are programming errors and panic instead of returning a variant.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FibError {
    /// An argument was out of range: a prefix length over 128, a next-hop
    /// that does not fit the configured entry width, or a configuration
    /// value outside its domain.
    Invalid,
    /// The update needs more TBL8 groups than the pool can supply. An add
    /// returning this error has not modified the dataplane.
    NoSpace,
    /// The prefix to delete is not present in the RIB.
    NotFound,
    /// The underlying memory allocation for the dataplane tables failed.
    AllocFailed,
}

impl std::error::Error for FibError {}

impl fmt::Display for FibError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FibError::Invalid => {
                write!(f, "Error: An argument is out of range.")
            }
            FibError::NoSpace => {
                write!(f, "Error: The TBL8 pool is exhausted.")
            }
            FibError::NotFound => {
                write!(f, "Error: The prefix cannot be found.")
            }
            FibError::AllocFailed => {
                write!(f, "Error: Allocating the dataplane tables failed.")
            }
        }
    }
}
