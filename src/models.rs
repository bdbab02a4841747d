use serde::{Deserialize, Serialize};
use std::fmt;

use crate::normalize::normalize_label;

/// Comparison-only form of a theme or category string.
///
/// Lower-cased, punctuation stripped, whitespace collapsed. An empty key means the
/// raw string carried no content and belongs to the unspecified bucket.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NormalizedKey(String);

impl NormalizedKey {
    pub fn new(raw: &str) -> Self {
        NormalizedKey(normalize_label(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NormalizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One annotated conversation, as validated by the loader.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub conversation_id: String,
    pub theme: String,
    pub category: String,
    pub confidence: f64,
    pub use_cases: Vec<String>,
    pub theme_key: NormalizedKey,
    pub category_key: NormalizedKey,
}

impl Label {
    pub fn new(
        conversation_id: impl Into<String>,
        theme: impl Into<String>,
        category: impl Into<String>,
        confidence: f64,
        use_cases: Vec<String>,
    ) -> Self {
        let theme = theme.into();
        let category = category.into();
        Self {
            conversation_id: conversation_id.into(),
            theme_key: NormalizedKey::new(&theme),
            category_key: NormalizedKey::new(&category),
            theme,
            category,
            confidence,
            use_cases,
        }
    }
}

/// Which label field a clustering pass works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Theme,
    Category,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Theme => "theme",
            Field::Category => "category",
        }
    }

    pub fn raw<'a>(&self, label: &'a Label) -> &'a str {
        match self {
            Field::Theme => &label.theme,
            Field::Category => &label.category,
        }
    }

    pub fn key<'a>(&self, label: &'a Label) -> &'a NormalizedKey {
        match self {
            Field::Theme => &label.theme_key,
            Field::Category => &label.category_key,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
