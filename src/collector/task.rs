//! Task unit dispatched to collector workers

use crate::browser::BrowserVariant;
use url::Url;

/// One unit of work: a page to scan under a set of browser variants.
///
/// Variants within a task are independent; a failure under one variant
/// never stops the others.
#[derive(Debug, Clone)]
pub struct CrawlTask {
    pub url: Url,
    pub variants: Vec<BrowserVariant>,
}

impl CrawlTask {
    pub fn new(url: Url, variants: Vec<BrowserVariant>) -> Self {
        Self { url, variants }
    }
}
