//! Error types.
//!
//! Name lookups in this crate never fail (unknown names resolve to a
//! documented default variant); the one hard error is an explicit parameter
//! assignment whose shape does not match the existing parameter tensor.

use std::fmt::{Display, Formatter};

/// Returned by `set_weights`/`set_bias` when the provided tensor does not
/// match the parameter's current shape. Silently reshaping would corrupt
/// the model, so this is refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShapeMismatch {
    pub existing: Vec<usize>,
    pub new: Vec<usize>,
}

impl Display for ShapeMismatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "shape mismatch: existing parameter has shape {:?}, got {:?}",
            self.existing, self.new
        )
    }
}

impl std::error::Error for ShapeMismatch {}
