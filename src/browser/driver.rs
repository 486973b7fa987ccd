use anyhow::Result;
use async_trait::async_trait;

/// The browser collaborator contract the extraction engine is written
/// against.
///
/// Every lookup is optional: a selector that matches nothing yields a
/// default (`None`, `0`, empty vec), never an error. Errors are reserved
/// for transport-level failures (dead session, protocol error).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Load the given URL in the session.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Number of elements matching the selector.
    async fn element_count(&self, selector: &str) -> Result<usize>;

    /// Visible text of the first element matching the selector.
    async fn text(&self, selector: &str) -> Result<Option<String>>;

    /// Attribute value of the first element matching the selector. `None`
    /// when either the element or the attribute is missing.
    async fn attr(&self, selector: &str, name: &str) -> Result<Option<String>>;

    /// Attribute values across all elements matching the selector; elements
    /// without the attribute are skipped.
    async fn attr_all(&self, selector: &str, name: &str) -> Result<Vec<String>>;

    /// The document title.
    async fn title(&self) -> Result<String>;
}
