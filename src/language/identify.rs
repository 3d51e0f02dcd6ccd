//! Statistical language identification.
//!
//! The model is expensive to build (hundreds of MB of n-gram tables), so
//! [`LinguaIdentifier`] builds it lazily behind a [`OnceCell`] and keeps it
//! read-only afterwards. Create one identifier per process, call
//! [`LinguaIdentifier::preload`] at startup, and share it as
//! `Arc<dyn LanguageIdentifier>`.

use crate::language::ResolutionError;
use std::sync::Arc;

/// One ranked guess from the identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Language tag as produced by the model (ISO 639-1 for lingua).
    pub tag: String,
    pub confidence: f64,
}

/// Free text → ranked language candidates, most likely first.
pub trait LanguageIdentifier: Send + Sync {
    fn identify(&self, text: &str) -> Result<Vec<Candidate>, ResolutionError>;
}

/// Identifier used when the `detect` feature is compiled out.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledIdentifier;

impl LanguageIdentifier for DisabledIdentifier {
    fn identify(&self, _text: &str) -> Result<Vec<Candidate>, ResolutionError> {
        Err(ResolutionError::Detection(
            "language detection is not compiled in (enable the `detect` feature)".into(),
        ))
    }
}

/// The identifier the system engines use by default.
pub fn default_identifier() -> Arc<dyn LanguageIdentifier> {
    #[cfg(feature = "detect")]
    {
        Arc::new(LinguaIdentifier::new())
    }
    #[cfg(not(feature = "detect"))]
    {
        Arc::new(DisabledIdentifier)
    }
}

#[cfg(feature = "detect")]
pub use self::lingua_backend::LinguaIdentifier;

#[cfg(feature = "detect")]
mod lingua_backend {
    use super::{Candidate, LanguageIdentifier};
    use crate::language::ResolutionError;
    use lingua::{LanguageDetector, LanguageDetectorBuilder};
    use once_cell::sync::OnceCell;
    use std::time::Instant;
    use tracing::info;

    /// Lingua-backed identifier over all supported languages.
    #[derive(Default)]
    pub struct LinguaIdentifier {
        detector: OnceCell<LanguageDetector>,
    }

    impl LinguaIdentifier {
        pub fn new() -> Self {
            Self::default()
        }

        /// Build the model now if it has not been built yet.
        pub fn preload(&self) -> &LanguageDetector {
            self.detector.get_or_init(|| {
                let start = Instant::now();
                let detector = LanguageDetectorBuilder::from_all_languages().build();
                info!("Language model loaded in {}ms", start.elapsed().as_millis());
                detector
            })
        }

        pub fn is_loaded(&self) -> bool {
            self.detector.get().is_some()
        }
    }

    impl LanguageIdentifier for LinguaIdentifier {
        fn identify(&self, text: &str) -> Result<Vec<Candidate>, ResolutionError> {
            let detector = self.preload();
            Ok(detector
                .compute_language_confidence_values(text)
                .into_iter()
                .filter(|(_, confidence)| *confidence > 0.0)
                .map(|(language, confidence)| Candidate {
                    tag: language.iso_code_639_1().to_string(),
                    confidence,
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_identifier_fails() {
        let err = DisabledIdentifier.identify("bonjour").unwrap_err();
        assert!(matches!(err, ResolutionError::Detection(_)));
    }

    #[cfg(feature = "detect")]
    #[test]
    fn lingua_identifier_is_lazy() {
        let id = LinguaIdentifier::new();
        assert!(!id.is_loaded());
    }
}
