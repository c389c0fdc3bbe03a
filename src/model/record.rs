use serde::{Deserialize, Serialize};

/// A comment attached to an extracted post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub commenter_id: String,
    pub commenter_name: String,
    pub text: String,
}

/// A single post extracted from a target page
///
/// Records are produced by the page script and copied into the run that
/// collected them; nothing refers back to the live page afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedRecord {
    /// Id of the target the post was collected from
    pub target_id: String,
    pub poster_id: String,
    pub poster_name: String,
    pub date: String,
    pub time: String,
    pub content: String,
    #[serde(default)]
    pub comments: Vec<Comment>,
}
