//! Stories are owned by the issue tracker; the core only references them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Project-scoped story key such as `ECOM-101`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoryKey(String);

impl StoryKey {
    pub fn new(key: impl Into<String>) -> Self {
        StoryKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The project prefix: everything before the last `-`.
    ///
    /// A key without a separator is its own project.
    pub fn project_key(&self) -> &str {
        match self.0.rsplit_once('-') {
            Some((project, _)) => project,
            None => &self.0,
        }
    }
}

impl fmt::Display for StoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StoryKey {
    fn from(key: &str) -> Self {
        StoryKey::new(key)
    }
}

impl From<String> for StoryKey {
    fn from(key: String) -> Self {
        StoryKey(key)
    }
}

/// The text fields an evaluation reads. Opaque to scoring; passed through to
/// the rating service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    pub key: StoryKey,
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub story_points: Option<u32>,
    #[serde(default)]
    pub sprint: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl Story {
    pub fn new(key: impl Into<StoryKey>, summary: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            summary: summary.into(),
            description: String::new(),
            acceptance_criteria: Vec::new(),
            story_points: None,
            sprint: None,
            status: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_acceptance_criterion(mut self, criterion: impl Into<String>) -> Self {
        self.acceptance_criteria.push(criterion.into());
        self
    }

    pub fn with_story_points(mut self, points: u32) -> Self {
        self.story_points = Some(points);
        self
    }

    pub fn with_sprint(mut self, sprint: impl Into<String>) -> Self {
        self.sprint = Some(sprint.into());
        self
    }

    pub fn project_key(&self) -> &str {
        self.key.project_key()
    }
}
