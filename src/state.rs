use bitflags::bitflags;
use serde::Serialize;

bitflags! {
    /// The field events that run validation.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct ValidateOn: u8 {
        const CHANGE = 1;
        const BLUR = 1 << 1;
        const FOCUS = 1 << 2;
        const SUBMIT = 1 << 3;
    }
}

impl Default for ValidateOn {
    fn default() -> Self {
        ValidateOn::CHANGE | ValidateOn::BLUR | ValidateOn::SUBMIT
    }
}

/// Aggregate form status, recomputed after every mutation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FormState {
    pub is_submitting: bool,
    pub is_validating: bool,
    /// `!has_errors`. Fields that were never validated count as valid.
    pub is_valid: bool,
    pub has_errors: bool,
    pub is_dirty: bool,
    pub is_touched: bool,
    pub submit_count: u32,
}
