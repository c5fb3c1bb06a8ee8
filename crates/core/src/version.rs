//! Optimistic concurrency expectations for versioned documents.

/// Version a transaction observed for a document when it read it.
///
/// Documents start at version 1 when first written and increase by one on every
/// committed write. A commit is accepted only if every expectation still holds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking.
    Any,
    /// The document must not exist.
    Missing,
    /// The document must be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    /// Expectation that reproduces what a read observed.
    pub fn observed(actual: Option<u64>) -> Self {
        match actual {
            Some(v) => ExpectedVersion::Exact(v),
            None => ExpectedVersion::Missing,
        }
    }

    pub fn matches(self, actual: Option<u64>) -> bool {
        match (self, actual) {
            (ExpectedVersion::Any, _) => true,
            (ExpectedVersion::Missing, None) => true,
            (ExpectedVersion::Exact(v), Some(a)) => v == a,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observed_round_trips_through_matches() {
        assert!(ExpectedVersion::observed(None).matches(None));
        assert!(ExpectedVersion::observed(Some(3)).matches(Some(3)));
        assert!(!ExpectedVersion::observed(Some(3)).matches(Some(4)));
        assert!(!ExpectedVersion::observed(None).matches(Some(1)));
        assert!(!ExpectedVersion::Exact(1).matches(None));
    }

    #[test]
    fn any_matches_every_version() {
        assert!(ExpectedVersion::Any.matches(None));
        assert!(ExpectedVersion::Any.matches(Some(7)));
        assert!(!ExpectedVersion::Missing.matches(Some(1)));
    }
}
