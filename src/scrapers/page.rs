//! Minimal headless-page seam.
//!
//! DOM adapters are written against this trait instead of a concrete
//! browser driver, so they can be exercised against a scripted fake. A
//! real implementation wraps one browser context per source attempt and
//! closes it afterwards, isolating cookies and fingerprints between
//! sources.

use async_trait::async_trait;

use crate::error::ScrapeError;

/// Resource types a page implementation should refuse to load; cuts
/// bandwidth on scraped pages by roughly three quarters.
pub const BLOCKED_RESOURCE_TYPES: &[&str] = &["image", "font", "stylesheet", "media", "analytics"];

#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate and wait for the document to settle.
    async fn goto(&self, url: &str) -> Result<(), ScrapeError>;

    /// Inner text of every element matching the CSS selector, in document
    /// order. An unknown selector yields an empty list, not an error.
    async fn query_selector_all(&self, selector: &str) -> Result<Vec<String>, ScrapeError>;

    /// Full rendered text of the page, for heuristic fallback extraction.
    async fn evaluate_text(&self) -> Result<String, ScrapeError>;
}

/// Opens a fresh page (one browser context) per source attempt.
#[async_trait]
pub trait PageFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn Page>, ScrapeError>;
}

/// Scripted page for adapter tests: selectors map to canned element
/// texts, and navigations are recorded.
#[cfg(test)]
pub struct FakePage {
    selectors: std::collections::HashMap<String, Vec<String>>,
    text: String,
    pub visited: std::sync::Mutex<Vec<String>>,
    fail_navigation: bool,
}

#[cfg(test)]
impl FakePage {
    pub fn new() -> Self {
        FakePage {
            selectors: std::collections::HashMap::new(),
            text: String::new(),
            visited: std::sync::Mutex::new(Vec::new()),
            fail_navigation: false,
        }
    }

    pub fn with_selector(mut self, selector: &str, elements: Vec<&str>) -> Self {
        self.selectors.insert(
            selector.to_string(),
            elements.into_iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn failing_navigation(mut self) -> Self {
        self.fail_navigation = true;
        self
    }
}

#[cfg(test)]
#[async_trait]
impl Page for FakePage {
    async fn goto(&self, url: &str) -> Result<(), ScrapeError> {
        if self.fail_navigation {
            return Err(ScrapeError::Transient(format!("navigation failed: {url}")));
        }
        self.visited.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn query_selector_all(&self, selector: &str) -> Result<Vec<String>, ScrapeError> {
        Ok(self.selectors.get(selector).cloned().unwrap_or_default())
    }

    async fn evaluate_text(&self) -> Result<String, ScrapeError> {
        Ok(self.text.clone())
    }
}
