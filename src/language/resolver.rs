//! Language resolution: filename and/or free text → validated [`LanguageCode`].
//!
//! ```text
//! strategy ──▶ raw code ──▶ normalise (639-1 → 639-3) ──▶ allowed? ──▶ LanguageCode
//!                  │                                          │
//!                  └─ no match                                └─ no
//!                        └────────── Strict: ResolutionError ─┘
//!                                    Lenient: default code
//! ```
//!
//! The `…OR…` strategies fall back exactly once, and only when the primary
//! strategy yields nothing. A raw code that later fails validation does not
//! trigger the fallback.

use crate::config::{ResolutionStrategy, ValidationPolicy};
use crate::language::identify::LanguageIdentifier;
use crate::language::tables::{LanguageCode, LanguageTables};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why no language could be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ResolutionError {
    /// The strategy needs a pattern but none is configured.
    #[error("strategy '{strategy}' requires language.extraction.regex")]
    MissingPattern { strategy: String },

    /// The pattern, after placeholder expansion, is not a valid regex.
    #[error("invalid language extraction pattern: {0}")]
    InvalidPattern(String),

    /// The filename pattern did not match (or had no group 1).
    #[error("no language code found in filename '{filename}'")]
    NoMatch { filename: String },

    /// The identifier returned no candidate whose code is allowed.
    #[error("no allowed language among detected candidates for '{text}'")]
    NoCandidate { text: String },

    /// The identifier itself failed.
    #[error("language detection failed: {0}")]
    Detection(String),

    /// A raw code was found but it is not in the allowed set.
    #[error("invalid iso language: {code}")]
    NotAllowed { code: String },

    /// The configured default is not in the allowed set.
    #[error("default language '{code}' is not an allowed language")]
    InvalidDefault { code: String },
}

/// Where the resolved code came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// `none` strategy: the configured default.
    Default,
    /// Captured from the filename.
    Regex,
    /// Picked from the identifier's ranking.
    Detection,
    /// Lenient policy replaced a failed resolution with the default.
    Substituted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub code: LanguageCode,
    pub source: ResolutionSource,
}

/// Inputs for one resolution.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionRequest<'a> {
    pub strategy: ResolutionStrategy,
    pub filename: &'a str,
    /// Text handed to the identifier for the `textdetection` strategies.
    pub detection_text: &'a str,
    /// Case-insensitive pattern; group 1 of the first match is the raw code.
    pub pattern: Option<&'a Regex>,
    /// Raw default code; validated against the allowed set before use.
    pub default: &'a str,
    pub policy: ValidationPolicy,
}

/// Resolves languages against shared, read-only tables and identifier.
#[derive(Clone)]
pub struct LanguageResolver {
    tables: Arc<LanguageTables>,
    identifier: Arc<dyn LanguageIdentifier>,
}

impl std::fmt::Debug for LanguageResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageResolver")
            .field("tables", &self.tables)
            .finish_non_exhaustive()
    }
}

impl LanguageResolver {
    pub fn new(tables: Arc<LanguageTables>, identifier: Arc<dyn LanguageIdentifier>) -> Self {
        Self { tables, identifier }
    }

    /// Resolve a language, honouring the validation policy.
    ///
    /// The default is only validated when it is used: by `none`, or when the
    /// lenient policy substitutes it. An invalid default in use is an error
    /// under both policies.
    pub fn resolve(&self, req: &ResolutionRequest<'_>) -> Result<Resolution, ResolutionError> {
        let raw = match req.strategy {
            ResolutionStrategy::None => {
                return Ok(Resolution {
                    code: self.default_code(req.default)?,
                    source: ResolutionSource::Default,
                })
            }
            ResolutionStrategy::Regex => self.by_regex(req),
            ResolutionStrategy::TextDetection => self.by_detection(req),
            ResolutionStrategy::RegexOrTextDetection => self.by_regex(req).or_else(|e| {
                debug!("Regex extraction failed ({e}), trying text detection");
                self.by_detection(req)
            }),
            ResolutionStrategy::TextDetectionOrRegex => self.by_detection(req).or_else(|e| {
                debug!("Text detection failed ({e}), trying regex extraction");
                self.by_regex(req)
            }),
        };

        let validated = raw.and_then(|(code, source)| {
            let normalized = self
                .tables
                .normalize(&code)
                .ok_or_else(|| ResolutionError::NotAllowed { code: code.clone() })?;
            self.tables
                .validate(&normalized)
                .map(|code| Resolution { code, source })
                .ok_or(ResolutionError::NotAllowed { code: normalized })
        });

        match (validated, req.policy) {
            (Ok(resolution), _) => {
                info!("Language resolved: {} ({:?})", resolution.code, resolution.source);
                Ok(resolution)
            }
            (Err(e), ValidationPolicy::Strict) => Err(e),
            (Err(e), ValidationPolicy::Lenient) => {
                let default = self.default_code(req.default)?;
                warn!("{e}; using default language {default}");
                Ok(Resolution {
                    code: default,
                    source: ResolutionSource::Substituted,
                })
            }
        }
    }

    fn default_code(&self, raw: &str) -> Result<LanguageCode, ResolutionError> {
        self.tables
            .normalize(raw)
            .and_then(|c| self.tables.validate(&c))
            .ok_or_else(|| ResolutionError::InvalidDefault {
                code: raw.to_string(),
            })
    }

    fn by_regex(
        &self,
        req: &ResolutionRequest<'_>,
    ) -> Result<(String, ResolutionSource), ResolutionError> {
        let pattern = req.pattern.ok_or_else(|| ResolutionError::MissingPattern {
            strategy: req.strategy.to_string(),
        })?;
        pattern
            .captures(req.filename)
            .and_then(|caps| caps.get(1))
            .map(|m| (m.as_str().to_string(), ResolutionSource::Regex))
            .ok_or_else(|| ResolutionError::NoMatch {
                filename: req.filename.to_string(),
            })
    }

    fn by_detection(
        &self,
        req: &ResolutionRequest<'_>,
    ) -> Result<(String, ResolutionSource), ResolutionError> {
        let candidates = self.identifier.identify(req.detection_text)?;
        for (i, candidate) in candidates.iter().enumerate() {
            let mapped = self.tables.lookup_tag(&candidate.tag);
            let allowed = mapped.as_deref().is_some_and(|c| self.tables.is_allowed(c));
            debug!(
                "Detect language candidate #{i}: {} ({:.3}) → {} allowed={allowed}",
                candidate.tag,
                candidate.confidence,
                mapped.as_deref().unwrap_or("-"),
            );
            if allowed {
                if let Some(code) = mapped {
                    return Ok((code, ResolutionSource::Detection));
                }
            }
        }
        Err(ResolutionError::NoCandidate {
            text: req.detection_text.to_string(),
        })
    }
}
