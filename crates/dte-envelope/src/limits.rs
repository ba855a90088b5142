//! Per-category envelope limits and envelope templates.

use dte_stamp::DocumentCategory;
use serde::{Deserialize, Serialize};

/// Limits for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeLimits {
    /// Maximum distinct document types (`SubTotDTE` entries).
    pub max_types: usize,
    /// Maximum documents.
    pub max_documents: usize,
}

/// Limits for both categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitTable {
    /// Full tax documents.
    pub tax_document: EnvelopeLimits,
    /// Simplified receipts.
    pub receipt: EnvelopeLimits,
}

impl LimitTable {
    /// Limits for `category`.
    pub fn for_category(&self, category: DocumentCategory) -> EnvelopeLimits {
        match category {
            DocumentCategory::TaxDocument => self.tax_document,
            DocumentCategory::Receipt => self.receipt,
        }
    }
}

impl Default for LimitTable {
    fn default() -> Self {
        Self {
            tax_document: EnvelopeLimits {
                max_types: 20,
                max_documents: 2000,
            },
            receipt: EnvelopeLimits {
                max_types: 2,
                max_documents: 1000,
            },
        }
    }
}

/// Root element name and schema location for a category's envelope.
pub(crate) fn template(category: DocumentCategory) -> (&'static str, &'static str) {
    match category {
        DocumentCategory::TaxDocument => ("EnvioDTE", "http://www.sii.cl/SiiDte EnvioDTE_v10.xsd"),
        DocumentCategory::Receipt => ("EnvioBOLETA", "http://www.sii.cl/SiiDte EnvioBOLETA_v11.xsd"),
    }
}
