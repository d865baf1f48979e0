//! Request context for visibility-scoped database operations
//!
//! Built once per request: who is asking, and which profiles they follow
//! with an accepted edge. Threaded explicitly to every component that needs
//! the visible-post scope instead of being re-queried per lookup.

use std::collections::HashSet;

use crate::error::StorageError;

/// Who is making the request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Viewer {
    Anonymous,
    /// Authenticated viewer, identified by profile id
    Profile(String),
}

/// Viewer plus the accepted-following set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub viewer: Viewer,
    following: HashSet<String>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self {
            viewer: Viewer::Anonymous,
            following: HashSet::new(),
        }
    }

    /// Context for an authenticated profile with its accepted followings
    pub fn for_profile(
        profile_id: impl Into<String>,
        following: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            viewer: Viewer::Profile(profile_id.into()),
            following: following.into_iter().collect(),
        }
    }

    pub fn profile_id(&self) -> Option<&str> {
        match &self.viewer {
            Viewer::Profile(id) => Some(id),
            Viewer::Anonymous => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.profile_id().is_some()
    }

    /// Authenticated profile id or 401
    pub fn require_profile(&self) -> Result<&str, StorageError> {
        self.profile_id()
            .ok_or_else(|| StorageError::Unauthorized("authentication required".into()))
    }

    pub fn is_self(&self, profile_id: &str) -> bool {
        self.profile_id() == Some(profile_id)
    }

    /// Accepted follow edge viewer -> `profile_id`
    pub fn follows(&self, profile_id: &str) -> bool {
        self.following.contains(profile_id)
    }

    /// Accepted-following ids, for `IN (...)` filters
    pub fn following_ids(&self) -> Vec<String> {
        self.following.iter().cloned().collect()
    }
}

impl std::fmt::Display for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.viewer {
            Viewer::Anonymous => write!(f, "RequestContext(anonymous)"),
            Viewer::Profile(id) => write!(f, "RequestContext({}, following={})", id, self.following.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_context() {
        let ctx = RequestContext::anonymous();
        assert!(!ctx.is_authenticated());
        assert!(matches!(ctx.require_profile(), Err(StorageError::Unauthorized(_))));
        assert!(!ctx.follows("anyone"));
    }

    #[test]
    fn test_profile_context() {
        let ctx = RequestContext::for_profile("me", vec!["alice".to_string()]);
        assert_eq!(ctx.require_profile().unwrap(), "me");
        assert!(ctx.is_self("me"));
        assert!(ctx.follows("alice"));
        assert!(!ctx.follows("bob"));
    }
}
