//! Field lifecycle events published on [`Form::latest_field_event`].
//!
//! [`Form::latest_field_event`]: crate::Form::latest_field_event

use serde::{Deserialize, Serialize};

use crate::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Before,
    After,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldAction {
    Change,
    Blur,
    Focus,
    Reset,
    Validate,
}

/// One step of a field operation. Every operation publishes a `Before`
/// event, does its work, then publishes the matching `After` event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldEvent {
    pub field: Path,
    pub phase: Phase,
    pub action: FieldAction,
}

impl FieldEvent {
    pub fn new(field: Path, phase: Phase, action: FieldAction) -> Self {
        Self {
            field,
            phase,
            action,
        }
    }

    pub fn before(field: Path, action: FieldAction) -> Self {
        Self::new(field, Phase::Before, action)
    }

    pub fn after(field: Path, action: FieldAction) -> Self {
        Self::new(field, Phase::After, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_dot_path() {
        let event = FieldEvent::after(Path::parse("roles.1"), FieldAction::Validate);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"field": "roles.1", "phase": "after", "action": "validate"})
        );
    }
}
