use std::fmt;

use serde::{Deserialize, Serialize};

/// Deployment version identifier. Bumped by the deployer when static assets
/// change; every cache directory carries the tag it was created under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionTag(String);

impl VersionTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheRole {
    Static,
    Dynamic,
    Image,
}

impl CacheRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheRole::Static => "static",
            CacheRole::Dynamic => "dynamic",
            CacheRole::Image => "image",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "static" => Some(CacheRole::Static),
            "dynamic" => Some(CacheRole::Dynamic),
            "image" => Some(CacheRole::Image),
            _ => None,
        }
    }
}

/// Structured cache identity. The serialized form `<tag>-<role>` doubles as
/// the on-disk directory name; parsing splits on the last dash so version
/// tags may themselves contain dashes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheName {
    tag: VersionTag,
    role: CacheRole,
}

impl CacheName {
    pub fn new(tag: VersionTag, role: CacheRole) -> Self {
        Self { tag, role }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let (tag, role) = value.rsplit_once('-')?;
        if tag.is_empty() {
            return None;
        }
        let role = CacheRole::parse(role)?;
        Some(Self {
            tag: VersionTag::new(tag),
            role,
        })
    }

    pub fn tag(&self) -> &VersionTag {
        &self.tag
    }

    pub fn role(&self) -> CacheRole {
        self.role
    }

    pub fn matches_tag(&self, tag: &VersionTag) -> bool {
        &self.tag == tag
    }

    pub fn dir_name(&self) -> String {
        format!("{}-{}", self.tag, self.role.as_str())
    }
}

impl fmt::Display for CacheName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.tag, self.role.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_dir_name() {
        let name = CacheName::new(VersionTag::new("v8.1"), CacheRole::Dynamic);
        assert_eq!(name.dir_name(), "v8.1-dynamic");
        assert_eq!(CacheName::parse("v8.1-dynamic"), Some(name));
    }

    #[test]
    fn tags_may_contain_dashes() {
        let parsed = CacheName::parse("hub-v8.1-static").expect("parse");
        assert_eq!(parsed.tag().as_str(), "hub-v8.1");
        assert_eq!(parsed.role(), CacheRole::Static);
    }

    #[test]
    fn rejects_unknown_roles_and_bare_names() {
        assert_eq!(CacheName::parse("v1-blobs"), None);
        assert_eq!(CacheName::parse("static"), None);
        assert_eq!(CacheName::parse("-static"), None);
    }

    #[test]
    fn stale_tag_filter() {
        let current = VersionTag::new("v9");
        let fresh = CacheName::new(current.clone(), CacheRole::Image);
        let stale = CacheName::new(VersionTag::new("v8"), CacheRole::Image);
        assert!(fresh.matches_tag(&current));
        assert!(!stale.matches_tag(&current));
    }
}
