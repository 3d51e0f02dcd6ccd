//! Static language tables: ISO 639-1 → 639-3 mapping and the allowed set.
//!
//! Both tables are Java-style properties sources. The bundled copies are
//! compiled in; deployments can point at their own files. Once built, a
//! [`LanguageTables`] is read-only and shared behind an `Arc`.

use crate::error::TessflowError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use tracing::debug;

pub const BUNDLED_ISO639_MAPPING: &str = include_str!("../../resources/iso639_mapping.properties");
pub const BUNDLED_ALLOWED_LANGUAGES: &str =
    include_str!("../../resources/allowed_languages.properties");

/// A language code that is a member of the allowed set.
///
/// Only [`LanguageTables::validate`] constructs one, so holding a
/// `LanguageCode` proves membership.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The ISO mapping table and allowed-language set.
#[derive(Debug, Clone)]
pub struct LanguageTables {
    iso639: HashMap<String, String>,
    allowed: BTreeSet<String>,
}

impl LanguageTables {
    /// Tables compiled into the crate.
    pub fn bundled() -> Self {
        Self::from_properties(BUNDLED_ISO639_MAPPING, BUNDLED_ALLOWED_LANGUAGES)
    }

    /// Build from two properties sources.
    ///
    /// `allowed` lists codes as `code=yes`; any other value excludes the code.
    pub fn from_properties(mapping: &str, allowed: &str) -> Self {
        let iso639 = parse_properties(mapping)
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v.to_lowercase()))
            .collect();
        let allowed = parse_properties(allowed)
            .into_iter()
            .filter(|(_, v)| v.eq_ignore_ascii_case("yes"))
            .map(|(k, _)| k.to_lowercase())
            .collect();
        Self { iso639, allowed }
    }

    /// Load from files, falling back to the bundled copy for any path not given.
    pub fn load(mapping: Option<&Path>, allowed: Option<&Path>) -> Result<Self, TessflowError> {
        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|source| TessflowError::ResourceRead {
                path: path.to_path_buf(),
                source,
            })
        };
        let mapping_src = match mapping {
            Some(p) => read(p)?,
            None => BUNDLED_ISO639_MAPPING.to_string(),
        };
        let allowed_src = match allowed {
            Some(p) => read(p)?,
            None => BUNDLED_ALLOWED_LANGUAGES.to_string(),
        };
        let tables = Self::from_properties(&mapping_src, &allowed_src);
        debug!(
            "Language tables loaded: {} mappings, {} allowed codes",
            tables.iso639.len(),
            tables.allowed.len()
        );
        Ok(tables)
    }

    /// Lowercase the raw code and map two-letter codes to their 639-3 form.
    ///
    /// Codes of any other length pass through unchanged, so normalising an
    /// already-normalised code is a no-op. Returns `None` for a two-letter
    /// code missing from the mapping.
    pub fn normalize(&self, raw: &str) -> Option<String> {
        let code = raw.trim().to_lowercase();
        if code.chars().count() == 2 {
            self.iso639.get(&code).cloned()
        } else {
            Some(code)
        }
    }

    /// Map a detector tag to its code. Tags may be 639-1 or already 639-3.
    pub fn lookup_tag(&self, tag: &str) -> Option<String> {
        self.normalize(tag)
    }

    /// Wrap `code` as a [`LanguageCode`] if it is allowed.
    pub fn validate(&self, code: &str) -> Option<LanguageCode> {
        let code = code.trim().to_lowercase();
        self.allowed.contains(&code).then_some(LanguageCode(code))
    }

    pub fn is_allowed(&self, code: &str) -> bool {
        self.allowed.contains(&code.trim().to_lowercase())
    }

    pub fn allowed(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }
}

impl Default for LanguageTables {
    fn default() -> Self {
        Self::bundled()
    }
}

/// Parse a properties source: `key=value` or `key:value` lines, `#`/`!`
/// comments, blank lines ignored. Keys and values are trimmed.
pub fn parse_properties(src: &str) -> Vec<(String, String)> {
    src.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('!'))
        .filter_map(|l| {
            let split = l.find(['=', ':'])?;
            let (k, v) = l.split_at(split);
            Some((k.trim().to_string(), v[1..].trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_tables_contain_core_codes() {
        let t = LanguageTables::bundled();
        for code in ["eng", "fra", "chi-sim", "deu-frak", "vie"] {
            assert!(t.is_allowed(code), "{code} should be allowed");
        }
        assert!(!t.is_allowed("xyz"));
        assert_eq!(t.allowed().count(), 68);
    }

    #[test]
    fn two_letter_codes_are_mapped() {
        let t = LanguageTables::bundled();
        assert_eq!(t.normalize("en").as_deref(), Some("eng"));
        assert_eq!(t.normalize("FR").as_deref(), Some("fra"));
        assert_eq!(t.normalize("zh").as_deref(), Some("chi-sim"));
        assert_eq!(t.normalize("qq"), None);
    }

    #[test]
    fn normalize_is_idempotent() {
        let t = LanguageTables::bundled();
        for raw in ["en", "eng", "fra", "chi-sim", "de"] {
            let once = t.normalize(raw).unwrap();
            let twice = t.normalize(&once).unwrap();
            assert_eq!(once, twice, "normalize({raw}) not idempotent");
        }
    }

    #[test]
    fn mapped_but_not_allowed() {
        let t = LanguageTables::bundled();
        let code = t.normalize("cy").unwrap();
        assert_eq!(code, "cym");
        assert!(t.validate(&code).is_none());
    }

    #[test]
    fn allowed_requires_yes() {
        let t = LanguageTables::from_properties("en=eng", "eng=yes\nfra=no\ndeu=YES");
        assert!(t.is_allowed("eng"));
        assert!(!t.is_allowed("fra"));
        assert!(t.is_allowed("deu"));
    }

    #[test]
    fn properties_parser_skips_comments() {
        let props = parse_properties("# c\n! c\n\n a = b \nc:d\nnovalue\n");
        assert_eq!(
            props,
            vec![("a".into(), "b".into()), ("c".into(), "d".into())]
        );
    }

    #[test]
    fn load_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let allowed = dir.path().join("allowed.properties");
        std::fs::write(&allowed, "eng=yes\n").unwrap();
        let t = LanguageTables::load(None, Some(&allowed)).unwrap();
        assert_eq!(t.allowed().collect::<Vec<_>>(), vec!["eng"]);
        assert_eq!(t.normalize("fr").as_deref(), Some("fra"));
    }

    #[test]
    fn load_missing_file_is_fatal() {
        let err = LanguageTables::load(Some(Path::new("/nonexistent/map.properties")), None)
            .unwrap_err();
        assert!(matches!(err, TessflowError::ResourceRead { .. }));
    }
}
