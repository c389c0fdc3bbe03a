use crate::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

/// A group page queued for visiting
///
/// Targets are unique by `id` and never change once enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub name: String,
    pub url: String,
}

impl Target {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
        }
    }

    /// Builds a target from a group URL, deriving the id from its `/groups/<id>` path
    ///
    /// When `name` is absent the derived id doubles as the display name.
    ///
    /// # Example
    ///
    /// ```
    /// use group_harvest::model::Target;
    ///
    /// let target = Target::from_group_url("https://www.facebook.com/groups/rustaceans/", None).unwrap();
    /// assert_eq!(target.id, "rustaceans");
    /// assert_eq!(target.name, "rustaceans");
    /// ```
    pub fn from_group_url(url: &str, name: Option<&str>) -> ModelResult<Self> {
        let parsed = parse_target_url(url)?;
        let id = group_id_from_url(&parsed)
            .ok_or_else(|| ModelError::MissingGroupId(url.to_string()))?;
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| id.clone());

        Ok(Self {
            id,
            name,
            url: parsed.to_string(),
        })
    }

    /// Parses the target URL
    pub fn parsed_url(&self) -> ModelResult<Url> {
        parse_target_url(&self.url)
    }
}

/// Extracts the group identifier from a `/groups/<id>` URL path
///
/// Listing pages such as `/groups/feed/` and `/groups/discover/` are not groups.
pub fn group_id_from_url(url: &Url) -> Option<String> {
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    segments.find(|s| *s == "groups")?;
    let id = segments.next()?;

    if matches!(id, "feed" | "discover" | "joins") {
        return None;
    }

    Some(id.to_string())
}

fn parse_target_url(url: &str) -> ModelResult<Url> {
    let parsed = Url::parse(url.trim()).map_err(|e| ModelError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ModelError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }

    if parsed.host_str().is_none() {
        return Err(ModelError::InvalidUrl {
            url: url.to_string(),
            reason: "missing host".to_string(),
        });
    }

    Ok(parsed)
}

/// Checks that a queue can be processed: non-empty unique ids and parsable URLs
pub fn validate_queue(targets: &[Target]) -> ModelResult<()> {
    let mut seen = HashSet::new();

    for target in targets {
        if target.id.trim().is_empty() {
            return Err(ModelError::EmptyTargetId);
        }
        if !seen.insert(target.id.as_str()) {
            return Err(ModelError::DuplicateTarget(target.id.clone()));
        }
        target.parsed_url()?;
    }

    Ok(())
}

/// Extraction parameters fixed for the duration of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSettings {
    /// Maximum number of posts to extract per target
    pub items_per_target: u32,

    /// Whether comments are extracted alongside posts
    pub include_secondary: bool,

    /// Synthesize records instead of visiting pages
    pub use_simulated_data: bool,
}

impl CollectionSettings {
    pub fn validate(&self) -> ModelResult<()> {
        if self.items_per_target == 0 {
            return Err(ModelError::ZeroItemsPerTarget);
        }
        Ok(())
    }
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            items_per_target: 10,
            include_secondary: true,
            use_simulated_data: false,
        }
    }
}
