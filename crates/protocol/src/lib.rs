//! Shared data model and wire contract for the matcher engine.
//!
//! The matching core and the HTTP façade both speak these types. Everything
//! here is plain serde data; no behavior beyond parsing and formatting.

use serde::{Deserialize, Serialize};

/// A job posting as supplied by the corpus source.
///
/// The matching engine only reads these during a build; ownership stays with
/// the external corpus process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    pub id: u64,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
}

/// Coarse role category used for filtering matches independent of vector
/// similarity. Unclassifiable text carries no tag and matches everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleTag {
    Fullstack,
    Devops,
}

impl RoleTag {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fullstack => "fullstack",
            Self::Devops => "devops",
        }
    }

    /// Parse a role name from a request. Unknown names and the explicit
    /// `general` role both mean "unfiltered" and yield `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "fullstack" => Some(Self::Fullstack),
            "devops" => Some(Self::Devops),
            _ => None,
        }
    }
}

/// Name reported for the absence of a role filter.
#[must_use]
pub fn role_name(role: Option<RoleTag>) -> &'static str {
    role.map_or("general", RoleTag::as_str)
}

fn default_top_k() -> i64 {
    5
}

/// Body of `POST /search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// One ranked match: stable record id plus inner-product score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HitDto {
    pub id: u64,
    pub score: f32,
}

/// Body of a successful `POST /search` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub status: String,
    /// Effective role the engine filtered by ("general" when unfiltered).
    pub role: String,
    pub count: usize,
    pub results: Vec<HitDto>,
}

/// Body of a successful `POST /index/build` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildResponse {
    pub status: String,
    pub count: usize,
    pub duration_ms: u64,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Error body shared by all endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    pub message: String,
}

impl ErrorBody {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn role_tag_parses_known_names() {
        assert_eq!(RoleTag::parse("fullstack"), Some(RoleTag::Fullstack));
        assert_eq!(RoleTag::parse(" DevOps "), Some(RoleTag::Devops));
        assert_eq!(RoleTag::parse("general"), None);
        assert_eq!(RoleTag::parse("quant"), None);
    }

    #[test]
    fn role_name_reports_general_for_none() {
        assert_eq!(role_name(None), "general");
        assert_eq!(role_name(Some(RoleTag::Devops)), "devops");
    }

    #[test]
    fn search_request_defaults_top_k() {
        let req: SearchRequest = serde_json::from_str(r#"{"query":"rust"}"#).unwrap();
        assert_eq!(req.top_k, 5);
        assert_eq!(req.role, None);
    }

    #[test]
    fn search_request_accepts_role() {
        let req: SearchRequest =
            serde_json::from_str(r#"{"query":"rust","top_k":3,"role":"devops"}"#).unwrap();
        assert_eq!(req.top_k, 3);
        assert_eq!(req.role.as_deref(), Some("devops"));
    }

    #[test]
    fn job_record_roundtrip() {
        let record = JobRecord {
            id: 7,
            title: "Backend Engineer".to_string(),
            company: "Acme".to_string(),
            location: "Remote".to_string(),
            description: "Rust services".to_string(),
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: JobRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
