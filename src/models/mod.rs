//! Domain model shared by the playlist parser, the guide decoder, the
//! reconciliation engine and the generator.

mod diagnostics;
mod guide;
mod playlist_entry;

pub use diagnostics::{DateBound, ReconciliationDiagnostics};
pub use guide::{ChannelKey, GuideChannel, Programme, ReferenceDates, SharedChannel};
pub use playlist_entry::{DerivedName, EntryAttributes, NameVariant, PlaylistEntry};

/// A display name (channel alias, programme title, category...) with an
/// optional language tag.
///
/// Two values are equal when their texts are equal ignoring case. The
/// language tag is carried along for output but never compared.
#[derive(Debug, Clone)]
pub struct NameValue {
    text: String,
    lang: Option<String>,
    folded: String,
}

impl NameValue {
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_lang(text, None)
    }

    pub fn with_lang(text: impl Into<String>, lang: Option<String>) -> Self {
        let text = text.into();
        let folded = fold_case(&text);
        Self { text, lang, folded }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn lang(&self) -> Option<&str> {
        self.lang.as_deref()
    }

    /// Lower-cased text used for comparisons
    pub fn folded(&self) -> &str {
        &self.folded
    }

    /// Case-insensitive comparison against an already folded string
    pub fn matches_folded(&self, folded: &str) -> bool {
        self.folded == folded
    }
}

impl PartialEq for NameValue {
    fn eq(&self, other: &Self) -> bool {
        self.folded == other.folded
    }
}

impl Eq for NameValue {}

impl std::fmt::Display for NameValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.lang {
            Some(lang) => write!(f, "{} [{}]", self.text, lang),
            None => f.write_str(&self.text),
        }
    }
}

/// Case folding used for every name comparison
pub fn fold_case(text: &str) -> String {
    text.to_lowercase()
}
