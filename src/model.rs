use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder for any field an adapter could not extract.
pub const UNKNOWN: &str = "unknown";

/// Keyword/location pair a run was requested with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub keyword: String,
    pub location: String,
}

impl SearchQuery {
    pub fn new(keyword: impl Into<String>, location: impl Into<String>) -> Self {
        SearchQuery {
            keyword: keyword.into().trim().to_string(),
            location: location.into().trim().to_string(),
        }
    }
}

/// A normalized job offer as produced by a source adapter.
///
/// `apply_link` is the identity of an offer: two offers with the same link
/// are the same logical offer. `source` is never set by extraction code, only
/// when an adapter run hands its results over to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOffer {
    #[serde(rename = "job_title")]
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary: String,
    #[serde(with = "tag_list", default)]
    pub tags: Vec<String>,
    pub apply_link: String,
    #[serde(default)]
    source: String,
}

impl JobOffer {
    /// Every optional field starts at the `unknown` sentinel.
    pub fn new(title: impl Into<String>, apply_link: impl Into<String>) -> Self {
        JobOffer {
            title: title.into(),
            company: UNKNOWN.to_string(),
            location: UNKNOWN.to_string(),
            salary: UNKNOWN.to_string(),
            tags: Vec::new(),
            apply_link: apply_link.into(),
            source: String::new(),
        }
    }

    pub fn company(mut self, value: impl Into<String>) -> Self {
        self.company = or_unknown(value.into());
        self
    }

    pub fn location(mut self, value: impl Into<String>) -> Self {
        self.location = or_unknown(value.into());
        self
    }

    pub fn salary(mut self, value: impl Into<String>) -> Self {
        self.salary = or_unknown(value.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags
            .into_iter()
            .map(|t| t.into().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        self
    }

    /// Display name of the source that produced this offer, empty until tagged.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tags_text(&self) -> String {
        self.tags.join(", ")
    }

    pub(crate) fn tag_source(&mut self, source: &str) {
        self.source = source.to_string();
    }
}

fn or_unknown(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        UNKNOWN.to_string()
    } else {
        trimmed.to_string()
    }
}

/// An offer as held by the store: numeric id plus persistence timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOffer {
    pub id: u64,
    #[serde(flatten)]
    pub offer: JobOffer,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// Audit record of one orchestration run. Write-once after it reaches a
/// terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub keyword: String,
    pub location: String,
    pub sources: Vec<String>,
    pub status: RunStatus,
    pub offers_found: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_summary: Option<String>,
    #[serde(default)]
    pub cancel_requested: bool,
}

/// Tags travel as comma-joined text (`"Python, Go"`) in every serialized form.
mod tag_list {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(tags: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&tags.join(", "))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let joined = String::deserialize(deserializer)?;
        Ok(joined
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect())
    }
}
