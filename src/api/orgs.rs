//! Organization listing and selection.

use std::sync::{Arc, PoisonError, RwLock};

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{decode, endpoint, ApiError, Requester};

/// The organization requests are scoped to.
///
/// Shared by every manager; `set_org` changes it for all of them.
#[derive(Debug, Clone, Default)]
pub struct OrgSelection(Arc<RwLock<Option<String>>>);

impl OrgSelection {
    /// Creates a selection, optionally with an initial org.
    #[must_use]
    pub fn new(initial: Option<String>) -> Self {
        Self(Arc::new(RwLock::new(initial)))
    }

    /// Returns the selected org.
    #[must_use]
    pub fn current(&self) -> Option<String> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Selects `org`.
    pub fn set(&self, org: String) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Some(org);
    }

    /// Query pairs scoping a request to the selected org.
    pub(crate) fn query(&self) -> Vec<(&'static str, String)> {
        self.current().map(|org| ("org", org)).into_iter().collect()
    }
}

/// An organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Org {
    /// Unique name.
    pub name: String,
}

/// Organization operations.
#[derive(Clone)]
pub struct OrgManager {
    requester: Arc<dyn Requester>,
    selection: OrgSelection,
}

impl OrgManager {
    pub(crate) fn new(requester: Arc<dyn Requester>, selection: OrgSelection) -> Self {
        Self {
            requester,
            selection,
        }
    }

    /// Lists the organizations the token can access.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    pub async fn list(&self, ctx: &CancellationToken) -> Result<Vec<Org>, ApiError> {
        let uri = endpoint(&["org"], &[])?;
        let body = self
            .requester
            .request(ctx, Method::GET, &uri, None, None)
            .await?;
        decode(&body)
    }

    /// Returns the selected org.
    #[must_use]
    pub fn current(&self) -> Option<String> {
        self.selection.current()
    }

    /// Selects `name` if it is one of the accessible orgs.
    ///
    /// Returns the matching org, or `None` when no org has that name
    /// (the selection is left unchanged).
    ///
    /// # Errors
    ///
    /// Returns an error if the org list cannot be fetched.
    pub async fn select(&self, ctx: &CancellationToken, name: &str) -> Result<Option<Org>, ApiError> {
        let found = self.list(ctx).await?.into_iter().find(|o| o.name == name);
        if let Some(org) = &found {
            self.selection.set(org.name.clone());
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::FakeRequester;
    use serde_json::json;

    #[test]
    fn selection_is_shared_between_clones() {
        let selection = OrgSelection::new(None);
        let other = selection.clone();
        assert!(other.query().is_empty());

        selection.set("acme".to_string());
        assert_eq!(other.current().as_deref(), Some("acme"));
        assert_eq!(other.query(), vec![("org", "acme".to_string())]);
    }

    #[tokio::test]
    async fn select_known_org() {
        let fake = Arc::new(FakeRequester::default());
        fake.respond(json!({"data": [{"name": "acme"}, {"name": "globex"}]}));
        let manager = OrgManager::new(fake, OrgSelection::new(Some("acme".to_string())));

        let org = manager
            .select(&CancellationToken::new(), "globex")
            .await
            .unwrap();
        assert_eq!(org.map(|o| o.name).as_deref(), Some("globex"));
        assert_eq!(manager.current().as_deref(), Some("globex"));
    }

    #[tokio::test]
    async fn select_unknown_org_keeps_selection() {
        let fake = Arc::new(FakeRequester::default());
        fake.respond(json!({"data": [{"name": "acme"}]}));
        let manager = OrgManager::new(fake, OrgSelection::new(Some("acme".to_string())));

        let org = manager
            .select(&CancellationToken::new(), "initech")
            .await
            .unwrap();
        assert!(org.is_none());
        assert_eq!(manager.current().as_deref(), Some("acme"));
    }
}
