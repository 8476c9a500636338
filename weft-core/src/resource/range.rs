//! Ranged access policy for aggregate resources.
//!
//! An array-like resource can be accessed element-wise (`at(i)`) or over a
//! half-open span (`slice(a..b)`). Two accesses conflict only when their
//! spans overlap *and* at least one of them writes, so narrow accesses to
//! disjoint regions of the same aggregate stay independent and run in
//! parallel.

use std::fmt;
use std::ops::Range;

use super::access::{AccessPolicy, Resource, ResourceAccess};
use super::io::IoAccess;

/// An access to a half-open span of an aggregate resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeAccess {
    /// Whether the span is read or written.
    pub mode: IoAccess,
    /// The accessed region, `start..end`.
    pub span: Range<usize>,
}

impl RangeAccess {
    /// A read access over `span`.
    pub fn read(span: Range<usize>) -> Self {
        Self {
            mode: IoAccess::Read,
            span,
        }
    }

    /// A write access over `span`.
    pub fn write(span: Range<usize>) -> Self {
        Self {
            mode: IoAccess::Write,
            span,
        }
    }

    fn overlaps(&self, other: &Self) -> bool {
        self.span.start < other.span.end && other.span.start < self.span.end
    }

    fn contains(&self, other: &Self) -> bool {
        self.span.start <= other.span.start && other.span.end <= self.span.end
    }
}

impl fmt::Display for RangeAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}..{}]", self.mode, self.span.start, self.span.end)
    }
}

impl AccessPolicy for RangeAccess {
    fn is_serial(a: &Self, b: &Self) -> bool {
        a.overlaps(b) && IoAccess::is_serial(&a.mode, &b.mode)
    }

    fn is_superset_of(&self, other: &Self) -> bool {
        self.contains(other) && self.mode.is_superset_of(&other.mode)
    }
}

/// A resource accessed over ranges, e.g. a field or buffer.
pub type RangeResource = Resource<RangeAccess>;

impl Resource<RangeAccess> {
    /// Start declaring an access to the single element at `index`.
    pub fn at(&self, index: usize) -> RangeAccessBuilder<'_> {
        self.slice(index..index + 1)
    }

    /// Start declaring an access to the elements in `span`.
    pub fn slice(&self, span: Range<usize>) -> RangeAccessBuilder<'_> {
        RangeAccessBuilder {
            resource: self,
            span,
        }
    }
}

/// Builder tying a span to an access mode.
///
/// Produced by [`Resource::at`] and [`Resource::slice`]; finished with
/// [`read`](RangeAccessBuilder::read) or [`write`](RangeAccessBuilder::write).
pub struct RangeAccessBuilder<'a> {
    resource: &'a Resource<RangeAccess>,
    span: Range<usize>,
}

impl RangeAccessBuilder<'_> {
    /// Declare the span as read.
    pub fn read(self) -> ResourceAccess {
        self.resource.make_access(RangeAccess::read(self.span))
    }

    /// Declare the span as written.
    pub fn write(self) -> ResourceAccess {
        self.resource.make_access(RangeAccess::write(self.span))
    }
}
