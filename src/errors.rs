//! Error taxonomy for the kernel.
//!
//! Only contract violations are hard failures. A rule that cannot
//! identify anything reports diagnostics (plain strings) next to an
//! empty result; an infeasible chromosome is repaired, not surfaced;
//! an exhausted time or iteration budget terminates a stream normally.

use thiserror::Error;

/// A malformed-model contract violation.
///
/// Raised when a decision model references elements absent from its
/// declared coverage, when instrumentation tables are missing entries
/// required for any feasible mapping, or when a value cannot be
/// represented in the genotype's declared integer ranges. These fail
/// the specific operation rather than silently producing a wrong
/// answer.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// A process has no finite worst-case execution time on any
    /// processing element of the platform.
    #[error("process {process} has no known execution time on any processing element")]
    MissingExecutionTime {
        /// The process without instrumentation.
        process: String,
    },
    /// A process or buffer has no memory requirement entry for a memory
    /// it would need to be mapped to.
    #[error("no memory requirement for {element} on {memory}")]
    MissingMemoryRequirement {
        /// The process or buffer missing the entry.
        element: String,
        /// The memory element the entry was needed for.
        memory: String,
    },
    /// A model references an element outside its declared coverage.
    #[error("element {element} is not covered by decision model {category}")]
    UnknownElement {
        /// The dangling element identifier.
        element: String,
        /// Category of the offending decision model.
        category: String,
    },
    /// A decision variable does not fit the declared genotype range.
    #[error("gene for {element} has value {value} outside range 0..{bound}")]
    GeneOutOfRange {
        /// The element whose decision variable is out of range.
        element: String,
        /// The offending value.
        value: usize,
        /// The exclusive upper bound of the segment.
        bound: usize,
    },
    /// An opaque body could not be decoded into the claimed category.
    #[error("malformed body for category {category}: {reason}")]
    MalformedBody {
        /// The claimed decision model category.
        category: String,
        /// Decoder failure description.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_offender() {
        let e = ModelError::MissingExecutionTime {
            process: "p1".to_string(),
        };
        assert!(e.to_string().contains("p1"));

        let e = ModelError::GeneOutOfRange {
            element: "b1".to_string(),
            value: 7,
            bound: 3,
        };
        assert!(e.to_string().contains("b1"));
        assert!(e.to_string().contains('7'));
    }
}
