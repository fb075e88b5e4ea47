//! Error types for the pure domain layer.

/// Errors raised while diffing or applying state modifiers.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ModifierError {
    #[error("cannot diff {previous} snapshot against {output} snapshot")]
    VariantMismatch {
        previous: &'static str,
        output: &'static str,
    },
}
