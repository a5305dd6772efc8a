//! Subject identity.
//!
//! A subject is a (participant, visit, session) triple. Its BIDS label is the
//! plain concatenation of the three parts, so participant `7014`, visit 1,
//! session 1 becomes `sub-701411`.

use crate::error::{PipelineError, PipelineResult};
use std::fmt;

/// A single acquisition session of one participant.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Subject {
    participant: String,
    visit: u32,
    session: u32,
}

impl Subject {
    /// Create a subject identifier.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidInput` if the participant id is empty
    /// or contains non-alphanumeric characters (it becomes part of BIDS
    /// filenames, where separators are significant).
    pub fn new(participant: impl Into<String>, visit: u32, session: u32) -> PipelineResult<Self> {
        let participant = participant.into();
        if participant.is_empty() || !participant.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(PipelineError::InvalidInput(format!(
                "participant id must be non-empty and alphanumeric, got {participant:?}"
            )));
        }
        Ok(Self {
            participant,
            visit,
            session,
        })
    }

    pub fn participant(&self) -> &str {
        &self.participant
    }

    pub fn visit(&self) -> u32 {
        self.visit
    }

    pub fn session(&self) -> u32 {
        self.session
    }

    /// The bare subject label: `<participant><visit><session>`.
    pub fn label(&self) -> String {
        format!("{}{}{}", self.participant, self.visit, self.session)
    }

    /// The BIDS directory/file prefix: `sub-<label>`.
    pub fn bids_label(&self) -> String {
        format!("sub-{}", self.label())
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.bids_label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_concatenates_parts() {
        let subject = Subject::new("7014", 1, 2).unwrap();
        assert_eq!(subject.label(), "701412");
        assert_eq!(subject.bids_label(), "sub-701412");
    }

    #[test]
    fn test_display_is_bids_label() {
        let subject = Subject::new("99", 1, 1).unwrap();
        assert_eq!(subject.to_string(), "sub-9911");
    }

    #[test]
    fn test_empty_participant_rejected() {
        assert!(Subject::new("", 1, 1).is_err());
    }

    #[test]
    fn test_separator_characters_rejected() {
        assert!(Subject::new("70_14", 1, 1).is_err());
        assert!(Subject::new("70-14", 1, 1).is_err());
    }
}
