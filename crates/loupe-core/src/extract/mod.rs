//! Extraction Module
//!
//! Language adapters turn source text into `RawSymbol` records; the
//! chunker produces line-bounded windows; the inference backstop
//! derives import/call edges when no semantic tooling is available.
//!
//! Adapters never fail a whole file: malformed fragments are skipped
//! and the rest of the file continues.

mod chunker;
mod inference;
mod python;
mod typescript;

pub use chunker::{Chunker, DEFAULT_BLOCK_LINES};
pub use inference::{EdgeInferencer, InferenceContext, InferenceReport};
pub use python::PythonAdapter;
pub use typescript::TypeScriptAdapter;

use crate::model::RawSymbol;

/// A language adapter: extension-selected symbol extractor
pub trait LanguageAdapter: Send + Sync {
    /// Stable language id (`typescript`, `python`, ...)
    fn language(&self) -> &'static str;

    /// File extensions this adapter claims (without the dot)
    fn extensions(&self) -> &'static [&'static str];

    /// Extract symbols from source text. Infallible by contract:
    /// unparseable fragments are skipped, not propagated.
    fn extract(&self, file_path: &str, source: &str) -> Vec<RawSymbol>;
}

/// Registry choosing adapters by file extension
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn LanguageAdapter>>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_languages(&["typescript", "javascript", "python"])
    }
}

impl AdapterRegistry {
    /// Build a registry for the enabled language set
    pub fn with_languages<S: AsRef<str>>(languages: &[S]) -> Self {
        let mut adapters: Vec<Box<dyn LanguageAdapter>> = Vec::new();
        for language in languages {
            match language.as_ref() {
                // One adapter covers the TS/JS family
                "typescript" | "javascript" => {
                    if !adapters.iter().any(|a| a.language() == "typescript") {
                        adapters.push(Box::new(TypeScriptAdapter::new()));
                    }
                }
                "python" => adapters.push(Box::new(PythonAdapter::new())),
                other => {
                    tracing::warn!("No adapter registered for language '{}'", other);
                }
            }
        }
        Self { adapters }
    }

    /// Adapter for a file path, by extension
    pub fn for_path(&self, file_path: &str) -> Option<&dyn LanguageAdapter> {
        let ext = file_path.rsplit('.').next()?;
        self.adapters
            .iter()
            .find(|a| a.extensions().contains(&ext))
            .map(|a| a.as_ref())
    }

    /// Language id for a file path, when an adapter claims it
    pub fn language_for_path(&self, file_path: &str) -> Option<&'static str> {
        let ext = file_path.rsplit('.').next()?;
        // The TS adapter reports plain JS files as javascript
        if matches!(ext, "js" | "jsx" | "mjs") {
            return self
                .adapters
                .iter()
                .any(|a| a.language() == "typescript")
                .then_some("javascript");
        }
        self.for_path(file_path).map(|a| a.language())
    }
}

// ============================================================================
// TESTS
// ============================================================================
