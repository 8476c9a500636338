//! Read/write access policy.
//!
//! The simplest useful conflict rule: two reads may run concurrently, any
//! pairing involving a write must be ordered. This is the policy most shared
//! cells and I/O handles want.

use std::fmt;

use super::access::{AccessPolicy, Resource, ResourceAccess};

/// Access modes of an [`IoResource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoAccess {
    /// Shared read access.
    Read,
    /// Exclusive write access.
    Write,
}

impl fmt::Display for IoAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoAccess::Read => write!(f, "read"),
            IoAccess::Write => write!(f, "write"),
        }
    }
}

impl AccessPolicy for IoAccess {
    fn is_serial(a: &Self, b: &Self) -> bool {
        // read/read is the only concurrent pairing
        !matches!((a, b), (IoAccess::Read, IoAccess::Read))
    }

    fn is_superset_of(&self, other: &Self) -> bool {
        match (self, other) {
            (IoAccess::Write, _) => true,
            (IoAccess::Read, IoAccess::Read) => true,
            (IoAccess::Read, IoAccess::Write) => false,
        }
    }
}

/// A resource accessed in read/write mode.
pub type IoResource = Resource<IoAccess>;

impl Resource<IoAccess> {
    /// Declare a shared read access on this resource.
    pub fn read(&self) -> ResourceAccess {
        self.make_access(IoAccess::Read)
    }

    /// Declare an exclusive write access on this resource.
    pub fn write(&self) -> ResourceAccess {
        self.make_access(IoAccess::Write)
    }
}
