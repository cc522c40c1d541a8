//! Optimistic concurrency expectations for mutable records.

/// What the writer believes the stored version of a record is.
///
/// Records start at version 1 when created and advance by one per write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// The record must not exist yet.
    Absent,
    /// The record must be at exactly this version.
    Exact(u64),
}

impl ExpectedVersion {
    /// Compare against the stored version (`None` when the record does not exist).
    pub fn matches(self, actual: Option<u64>) -> bool {
        match (self, actual) {
            (ExpectedVersion::Absent, None) => true,
            (ExpectedVersion::Exact(v), Some(a)) => v == a,
            _ => false,
        }
    }

    /// Version the record will have after a successful write.
    pub fn next(self) -> u64 {
        match self {
            ExpectedVersion::Absent => 1,
            ExpectedVersion::Exact(v) => v + 1,
        }
    }
}
