//! BIDS filename assembly and parsing.
//!
//! [`BidsName`] builds filenames with entities in canonical order
//! (`sub`, `ses`, `task`, literal segments, `space`, `den`, `hemi`, `desc`)
//! followed by the suffix and extension, e.g.
//! `sub-701411_task-rest_space-T1w_desc-preproc_bold.nii.gz`.

use regex::Regex;
use std::sync::OnceLock;

/// Builder for a BIDS-style filename.
#[derive(Clone, Debug)]
pub struct BidsName {
    subject: String,
    session: Option<String>,
    task: Option<String>,
    literal: Option<String>,
    space: Option<String>,
    density: Option<String>,
    hemi: Option<String>,
    desc: Option<String>,
    suffix: String,
    extension: String,
}

impl BidsName {
    /// Start a name for a bare subject label (without the `sub-` prefix).
    pub fn new(subject_label: &str, suffix: &str, extension: &str) -> Self {
        Self {
            subject: subject_label.to_string(),
            session: None,
            task: None,
            literal: None,
            space: None,
            density: None,
            hemi: None,
            desc: None,
            suffix: suffix.to_string(),
            extension: extension.to_string(),
        }
    }

    pub fn session(mut self, session: &str) -> Self {
        self.session = Some(session.to_string());
        self
    }

    pub fn task(mut self, task: &str) -> Self {
        self.task = Some(task.to_string());
        self
    }

    /// Insert a caller-supplied segment verbatim (used for explicit run
    /// names that already carry their own entities).
    pub fn literal(mut self, segment: &str) -> Self {
        self.literal = Some(segment.to_string());
        self
    }

    pub fn space(mut self, space: &str) -> Self {
        self.space = Some(space.to_string());
        self
    }

    pub fn density(mut self, density: &str) -> Self {
        self.density = Some(density.to_string());
        self
    }

    pub fn hemi(mut self, hemi: &str) -> Self {
        self.hemi = Some(hemi.to_string());
        self
    }

    pub fn desc(mut self, desc: &str) -> Self {
        self.desc = Some(desc.to_string());
        self
    }

    pub fn extension(mut self, extension: &str) -> Self {
        self.extension = extension.to_string();
        self
    }

    /// Assemble the filename.
    pub fn build(&self) -> String {
        let mut parts = vec![format!("sub-{}", self.subject)];
        if let Some(session) = &self.session {
            parts.push(format!("ses-{session}"));
        }
        if let Some(task) = &self.task {
            parts.push(format!("task-{task}"));
        }
        if let Some(literal) = &self.literal {
            parts.push(literal.clone());
        }
        if let Some(space) = &self.space {
            parts.push(format!("space-{space}"));
        }
        if let Some(density) = &self.density {
            parts.push(format!("den-{density}"));
        }
        if let Some(hemi) = &self.hemi {
            parts.push(format!("hemi-{hemi}"));
        }
        if let Some(desc) = &self.desc {
            parts.push(format!("desc-{desc}"));
        }
        parts.push(self.suffix.clone());
        format!("{}.{}", parts.join("_"), self.extension)
    }
}

fn entity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(^|_)([a-zA-Z]+)-([a-zA-Z0-9]+)").unwrap())
}

/// Extract a single entity value (e.g. `sub`, `task`) from a BIDS filename.
pub fn entity(filename: &str, key: &str) -> Option<String> {
    entity_regex()
        .captures_iter(filename)
        .find(|caps| &caps[2] == key)
        .map(|caps| caps[3].to_string())
}

/// Strip the (possibly double) extension from a filename.
pub fn stem(filename: &str) -> &str {
    filename
        .strip_suffix(".nii.gz")
        .or_else(|| filename.split_once('.').map(|(stem, _)| stem))
        .unwrap_or(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_name() {
        let name = BidsName::new("701411", "bold", "nii.gz").task("rest");
        assert_eq!(name.build(), "sub-701411_task-rest_bold.nii.gz");
    }

    #[test]
    fn test_entity_ordering() {
        let name = BidsName::new("01", "bold", "nii.gz")
            .task("rest")
            .desc("preproc")
            .space("T1w");
        assert_eq!(
            name.build(),
            "sub-01_task-rest_space-T1w_desc-preproc_bold.nii.gz"
        );
    }

    #[test]
    fn test_surface_name() {
        let name = BidsName::new("01", "bold", "func.gii")
            .task("rest")
            .space("fsLR")
            .density("59k")
            .hemi("L");
        assert_eq!(
            name.build(),
            "sub-01_task-rest_space-fsLR_den-59k_hemi-L_bold.func.gii"
        );
    }

    #[test]
    fn test_literal_segment() {
        let name = BidsName::new("01", "bold", "nii.gz").literal("run2");
        assert_eq!(name.build(), "sub-01_run2_bold.nii.gz");
    }

    #[test]
    fn test_entity_extraction() {
        let filename = "sub-701411_task-rest_bold_preproc.nii.gz";
        assert_eq!(entity(filename, "sub").as_deref(), Some("701411"));
        assert_eq!(entity(filename, "task").as_deref(), Some("rest"));
        assert_eq!(entity(filename, "space"), None);
    }

    #[test]
    fn test_stem() {
        assert_eq!(stem("sub-01_bold.nii.gz"), "sub-01_bold");
        assert_eq!(stem("sub-01_bold.json"), "sub-01_bold");
        assert_eq!(stem("README"), "README");
    }
}
