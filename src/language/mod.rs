//! Language resolution: static tables, identification, and the strategy chain.

pub mod identify;
pub mod resolver;
pub mod tables;

pub use identify::{default_identifier, Candidate, DisabledIdentifier, LanguageIdentifier};
#[cfg(feature = "detect")]
pub use identify::LinguaIdentifier;
pub use resolver::{
    LanguageResolver, Resolution, ResolutionError, ResolutionRequest, ResolutionSource,
};
pub use tables::{LanguageCode, LanguageTables};
