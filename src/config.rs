//! Configuration for the OCR, split and convert pipelines.
//!
//! All processor behaviour is controlled through [`PipelineConfig`], built
//! via its [`PipelineConfigBuilder`] or parsed from a properties source with
//! [`PipelineConfig::from_properties`]. One config is shared read-only by
//! every traversal; the string options that may reference document
//! attributes are expanded per document by [`PipelineConfig::settings_for`].

use crate::document::Document;
use crate::error::{TessflowError, TraversalError};
use crate::language::tables::parse_properties;
use crate::language::ResolutionError;
use once_cell::sync::Lazy;
use regex::{Captures, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_LANGUAGE_REGEX: &str = r".*[-_](\w{2,3})[-_]\d{5}\.\w{3,4}";
pub const DEFAULT_INSTALL_DIR: &str = "/usr/share/tesseract-ocr/tessdata/";
pub const DEFAULT_LANGUAGE: &str = "eng";

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z0-9_.\-]+)\}").unwrap());

/// Configuration shared by all processors.
///
/// # Example
/// ```rust
/// use tessflow::config::{PipelineConfig, ResolutionStrategy};
///
/// let config = PipelineConfig::builder()
///     .strategy(ResolutionStrategy::Regex)
///     .default_language("fra")
///     .concurrency(8)
///     .build()
///     .unwrap();
/// assert_eq!(config.default_language, "fra");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// How the processing language is derived. Default: `none`.
    pub strategy: ResolutionStrategy,

    /// Capture-group-1 pattern matched case-insensitively against the filename.
    /// May contain `${attribute}` placeholders.
    pub language_regex: String,

    /// Tessdata directory forwarded to the recognizer. May contain placeholders.
    pub install_dir: String,

    /// OCR engine mode, 0–2. Default: 2.
    pub engine_mode: u8,

    /// Page segmentation mode, 0–13. Default: 3.
    pub page_seg_mode: u8,

    /// Default language code. May contain placeholders. Default: `eng`.
    pub default_language: String,

    pub output_format: OutputFormat,

    /// Strict fails a document whose language cannot be validated; lenient
    /// substitutes the default.
    pub validation: ValidationPolicy,

    /// Which rasterized PDF pages are recognized. Default: first.
    pub page_scope: PageScope,

    /// Maximum rendered image dimension in pixels. Default: 2000.
    ///
    /// Caps either dimension of a rasterized page so a large-format PDF page
    /// does not allocate an unbounded pixel buffer.
    pub max_rendered_pixels: u32,

    /// Upper bound for each blocking stage. Default: none.
    pub stage_timeout_secs: Option<u64>,

    /// Documents processed concurrently by a batch. Default: 4.
    pub concurrency: usize,

    pub iso639_mapping_path: Option<PathBuf>,
    pub allowed_languages_path: Option<PathBuf>,

    /// Directory containing the pdfium shared library. `None` uses the
    /// system library search path.
    pub pdfium_library_path: Option<PathBuf>,

    /// Tesseract executable. Default: `tesseract` on `PATH`.
    pub tesseract_binary: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strategy: ResolutionStrategy::None,
            language_regex: DEFAULT_LANGUAGE_REGEX.to_string(),
            install_dir: DEFAULT_INSTALL_DIR.to_string(),
            engine_mode: 2,
            page_seg_mode: 3,
            default_language: DEFAULT_LANGUAGE.to_string(),
            output_format: OutputFormat::default(),
            validation: ValidationPolicy::default(),
            page_scope: PageScope::default(),
            max_rendered_pixels: 2000,
            stage_timeout_secs: None,
            concurrency: 4,
            iso639_mapping_path: None,
            allowed_languages_path: None,
            pdfium_library_path: None,
            tesseract_binary: PathBuf::from("tesseract"),
        }
    }
}

/// Engine parameters passed through to the recognizer untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineParams {
    pub install_dir: PathBuf,
    pub engine_mode: u8,
    pub page_seg_mode: u8,
}

/// The placeholder-expanded options for one document.
#[derive(Debug, Clone)]
pub struct DocumentSettings {
    /// Compiled pattern, present only when the strategy uses one.
    pub regex: Option<Regex>,
    pub default_language: String,
    pub engine: EngineParams,
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Turn this config back into a builder, e.g. to layer CLI flags over a file.
    pub fn into_builder(self) -> PipelineConfigBuilder {
        PipelineConfigBuilder { config: self }
    }

    /// Parse `key=value` option pairs over the defaults.
    ///
    /// Accepts the short keys as well as their `tesseract.`/`filename.`
    /// prefixed legacy forms. Unknown keys are rejected.
    pub fn from_properties<I, K, V>(entries: I) -> Result<Self, TessflowError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut b = Self::builder();
        for (key, value) in entries {
            let (key, value) = (key.as_ref().trim(), value.as_ref().trim());
            b = match key {
                "language.extraction.mode" | "filename.language.extraction.mode" => {
                    b.strategy(value.parse()?)
                }
                "language.extraction.regex" | "filename.language.extraction.regex" => {
                    b.language_regex(value)
                }
                "install.dir" | "tesseract.install.dir" => b.install_dir(value),
                "engine.mode" | "tesseract.engine.mode" => b.engine_mode(parse_num(key, value)?),
                "page.seg.mode" | "tesseract.page.seg.mode" => {
                    b.page_seg_mode(parse_num(key, value)?)
                }
                "default.language" => b.default_language(value),
                "output.format" | "tesseract.output.format" => b.output_format(value.parse()?),
                "language.validation" => b.validation(value.parse()?),
                "ocr.pages" => b.page_scope(value.parse()?),
                "language.mapping.file" => b.iso639_mapping_path(value),
                "language.allowed.file" => b.allowed_languages_path(value),
                "stage.timeout.secs" => b.stage_timeout_secs(parse_num(key, value)?),
                "concurrency" => b.concurrency(parse_num(key, value)?),
                "max.rendered.pixels" => b.max_rendered_pixels(parse_num(key, value)?),
                "pdfium.library.path" => b.pdfium_library_path(value),
                "tesseract.binary" => b.tesseract_binary(value),
                other => {
                    return Err(TessflowError::UnknownOption {
                        key: other.to_string(),
                    })
                }
            };
        }
        b.build()
    }

    /// Read a properties file and parse it with [`PipelineConfig::from_properties`].
    pub fn from_properties_file(path: &Path) -> Result<Self, TessflowError> {
        let src = std::fs::read_to_string(path).map_err(|source| TessflowError::ResourceRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_properties(parse_properties(&src))
    }

    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }

    /// Expand placeholders against `doc` and compile the language pattern.
    pub fn settings_for(&self, doc: &Document) -> Result<DocumentSettings, TraversalError> {
        let attrs = doc.attributes();
        let regex = if self.strategy.uses_regex() {
            let pattern = expand_attributes(&self.language_regex, attrs);
            Some(compile_pattern(&pattern).map_err(ResolutionError::InvalidPattern)?)
        } else {
            None
        };
        Ok(DocumentSettings {
            regex,
            default_language: expand_attributes(&self.default_language, attrs),
            engine: EngineParams {
                install_dir: PathBuf::from(expand_attributes(&self.install_dir, attrs)),
                engine_mode: self.engine_mode,
                page_seg_mode: self.page_seg_mode,
            },
        })
    }
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> Result<T, TessflowError> {
    value
        .parse()
        .map_err(|_| TessflowError::InvalidConfig(format!("'{key}' expects a number, got '{value}'")))
}

fn compile_pattern(pattern: &str) -> Result<Regex, String> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| e.to_string())
}

/// Replace every `${key}` in `template` with the attribute value, or with
/// nothing when the attribute is absent.
pub fn expand_attributes(template: &str, attrs: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            attrs.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn strategy(mut self, strategy: ResolutionStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn language_regex(mut self, pattern: impl Into<String>) -> Self {
        self.config.language_regex = pattern.into();
        self
    }

    pub fn install_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.install_dir = dir.into();
        self
    }

    pub fn engine_mode(mut self, mode: u8) -> Self {
        self.config.engine_mode = mode;
        self
    }

    pub fn page_seg_mode(mut self, mode: u8) -> Self {
        self.config.page_seg_mode = mode;
        self
    }

    pub fn default_language(mut self, code: impl Into<String>) -> Self {
        self.config.default_language = code.into();
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    pub fn validation(mut self, policy: ValidationPolicy) -> Self {
        self.config.validation = policy;
        self
    }

    pub fn page_scope(mut self, scope: PageScope) -> Self {
        self.config.page_scope = scope;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn stage_timeout_secs(mut self, secs: u64) -> Self {
        self.config.stage_timeout_secs = (secs > 0).then_some(secs);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn iso639_mapping_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.iso639_mapping_path = Some(path.into());
        self
    }

    pub fn allowed_languages_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.allowed_languages_path = Some(path.into());
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn tesseract_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_binary = path.into();
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// Membership of the default language in the allowed set depends on the
    /// language tables and is checked when a processor is constructed.
    pub fn build(self) -> Result<PipelineConfig, TessflowError> {
        let c = &self.config;
        if c.engine_mode > 2 {
            return Err(TessflowError::InvalidConfig(format!(
                "engine.mode must be 0–2, got {}",
                c.engine_mode
            )));
        }
        if c.page_seg_mode > 13 {
            return Err(TessflowError::InvalidConfig(format!(
                "page.seg.mode must be 0–13, got {}",
                c.page_seg_mode
            )));
        }
        if c.concurrency == 0 {
            return Err(TessflowError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        if !PLACEHOLDER.is_match(&c.language_regex) {
            compile_pattern(&c.language_regex).map_err(|e| {
                TessflowError::InvalidConfig(format!("language.extraction.regex: {e}"))
            })?;
        }
        if c.default_language.trim().is_empty() {
            return Err(TessflowError::InvalidConfig(
                "default.language must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How a language code is derived from a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResolutionStrategy {
    /// Use the default language.
    #[default]
    #[serde(rename = "none")]
    None,
    /// Capture group 1 of the filename pattern.
    #[serde(rename = "regex")]
    Regex,
    /// Statistical identification.
    #[serde(rename = "textdetection")]
    TextDetection,
    #[serde(rename = "regexORtextdetection")]
    RegexOrTextDetection,
    #[serde(rename = "textdetectionORregex")]
    TextDetectionOrRegex,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Regex => "regex",
            Self::TextDetection => "textdetection",
            Self::RegexOrTextDetection => "regexORtextdetection",
            Self::TextDetectionOrRegex => "textdetectionORregex",
        }
    }

    pub fn uses_regex(&self) -> bool {
        matches!(
            self,
            Self::Regex | Self::RegexOrTextDetection | Self::TextDetectionOrRegex
        )
    }

    pub fn uses_detection(&self) -> bool {
        matches!(
            self,
            Self::TextDetection | Self::RegexOrTextDetection | Self::TextDetectionOrRegex
        )
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = TessflowError;

    /// Case-insensitive: `regexortextdetection` and `regexORtextdetection` are equal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::None,
            Self::Regex,
            Self::TextDetection,
            Self::RegexOrTextDetection,
            Self::TextDetectionOrRegex,
        ]
        .into_iter()
        .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| {
            TessflowError::InvalidConfig(format!(
                "unknown language.extraction.mode '{s}' \
                 (expected none, regex, textdetection, regexORtextdetection, textdetectionORregex)"
            ))
        })
    }
}

/// What happens when a resolved code is not in the allowed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Fail the document.
    #[default]
    Strict,
    /// Substitute the default language.
    Lenient,
}

impl FromStr for ValidationPolicy {
    type Err = TessflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            _ => Err(TessflowError::InvalidConfig(format!(
                "language.validation must be strict or lenient, got '{s}'"
            ))),
        }
    }
}

/// Packaging of the recognized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// `<filename>.txt`, UTF-8 plain text.
    #[default]
    #[serde(rename = "TXT")]
    Txt,
    /// `<filename>.pdf`, one text page per recognized page.
    #[serde(rename = "PDFDOC")]
    PdfDoc,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Txt => "txt",
            Self::PdfDoc => "pdf",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Txt => "text/plain; charset=utf-8",
            Self::PdfDoc => "application/pdf",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = TessflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TXT" => Ok(Self::Txt),
            "PDFDOC" | "PDF" => Ok(Self::PdfDoc),
            _ => Err(TessflowError::InvalidConfig(format!(
                "output.format must be TXT or PDFDOC, got '{s}'"
            ))),
        }
    }
}

/// Which rasterized PDF pages the OCR processor recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageScope {
    #[default]
    First,
    All,
}

impl FromStr for PageScope {
    type Err = TessflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(Self::First),
            "all" => Ok(Self::All),
            _ => Err(TessflowError::InvalidConfig(format!(
                "ocr.pages must be first or all, got '{s}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = PipelineConfig::default();
        assert_eq!(c.strategy, ResolutionStrategy::None);
        assert_eq!(c.engine_mode, 2);
        assert_eq!(c.page_seg_mode, 3);
        assert_eq!(c.default_language, "eng");
        assert_eq!(c.output_format, OutputFormat::Txt);
        assert_eq!(c.validation, ValidationPolicy::Strict);
        assert_eq!(c.page_scope, PageScope::First);
        assert_eq!(c.concurrency, 4);
        assert!(c.stage_timeout().is_none());
        assert!(PipelineConfig::builder().build().is_ok());
    }

    #[test]
    fn strategy_parse_is_case_insensitive() {
        assert_eq!(
            "REGEXORTEXTDETECTION".parse::<ResolutionStrategy>().unwrap(),
            ResolutionStrategy::RegexOrTextDetection
        );
        assert_eq!(
            "textdetectionORregex".parse::<ResolutionStrategy>().unwrap(),
            ResolutionStrategy::TextDetectionOrRegex
        );
        assert!("ocr".parse::<ResolutionStrategy>().is_err());
    }

    #[test]
    fn strategy_capabilities() {
        assert!(!ResolutionStrategy::None.uses_regex());
        assert!(!ResolutionStrategy::None.uses_detection());
        assert!(ResolutionStrategy::Regex.uses_regex());
        assert!(!ResolutionStrategy::Regex.uses_detection());
        assert!(ResolutionStrategy::TextDetectionOrRegex.uses_regex());
        assert!(ResolutionStrategy::TextDetectionOrRegex.uses_detection());
    }

    #[test]
    fn properties_short_and_legacy_keys() {
        let c = PipelineConfig::from_properties([
            ("filename.language.extraction.mode", "regex"),
            ("tesseract.engine.mode", "1"),
            ("page.seg.mode", "6"),
            ("tesseract.output.format", "PDFDOC"),
            ("language.validation", "lenient"),
            ("ocr.pages", "all"),
            ("stage.timeout.secs", "30"),
        ])
        .unwrap();
        assert_eq!(c.strategy, ResolutionStrategy::Regex);
        assert_eq!(c.engine_mode, 1);
        assert_eq!(c.page_seg_mode, 6);
        assert_eq!(c.output_format, OutputFormat::PdfDoc);
        assert_eq!(c.validation, ValidationPolicy::Lenient);
        assert_eq!(c.page_scope, PageScope::All);
        assert_eq!(c.stage_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn unknown_key_rejected() {
        let err = PipelineConfig::from_properties([("tesseract.colour", "red")]).unwrap_err();
        assert!(matches!(err, TessflowError::UnknownOption { key } if key == "tesseract.colour"));
    }

    #[test]
    fn out_of_range_modes_rejected() {
        assert!(PipelineConfig::from_properties([("engine.mode", "3")]).is_err());
        assert!(PipelineConfig::from_properties([("page.seg.mode", "14")]).is_err());
        assert!(PipelineConfig::from_properties([("engine.mode", "two")]).is_err());
    }

    #[test]
    fn invalid_regex_rejected_at_build() {
        let err = PipelineConfig::builder()
            .language_regex("(unclosed")
            .build()
            .unwrap_err();
        assert!(matches!(err, TessflowError::InvalidConfig(_)));
    }

    #[test]
    fn properties_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ocr.properties");
        std::fs::write(
            &path,
            "# pipeline\nlanguage.extraction.mode = textdetection\ndefault.language=deu\n",
        )
        .unwrap();
        let c = PipelineConfig::from_properties_file(&path).unwrap();
        assert_eq!(c.strategy, ResolutionStrategy::TextDetection);
        assert_eq!(c.default_language, "deu");
    }

    #[test]
    fn placeholders_expand_from_attributes() {
        let mut attrs = BTreeMap::new();
        attrs.insert("lang".to_string(), "fra".to_string());
        assert_eq!(expand_attributes("${lang}", &attrs), "fra");
        assert_eq!(expand_attributes("/data/${missing}/x", &attrs), "/data//x");
        assert_eq!(expand_attributes("plain", &attrs), "plain");
    }

    #[test]
    fn settings_for_expands_per_document() {
        let config = PipelineConfig::builder()
            .strategy(ResolutionStrategy::Regex)
            .language_regex(r".*_(\w{3})_${batch}\.pdf")
            .install_dir("/opt/${tessdata}")
            .default_language("${fallback}")
            .build()
            .unwrap();
        let mut doc = Document::new("inv_spa_b7.pdf", vec![]);
        doc.put_attributes([("batch", "b7"), ("tessdata", "td"), ("fallback", "ita")]);

        let s = config.settings_for(&doc).unwrap();
        let caps = s.regex.as_ref().unwrap().captures("INV_SPA_B7.PDF").unwrap();
        assert_eq!(&caps[1], "SPA");
        assert_eq!(s.engine.install_dir, PathBuf::from("/opt/td"));
        assert_eq!(s.default_language, "ita");
    }

    #[test]
    fn settings_for_reports_bad_expanded_pattern() {
        let config = PipelineConfig::builder()
            .strategy(ResolutionStrategy::Regex)
            .language_regex("${pattern}")
            .build()
            .unwrap();
        let mut doc = Document::new("a.pdf", vec![]);
        doc.put_attribute("pattern", "(oops");
        let err = config.settings_for(&doc).unwrap_err();
        assert!(matches!(
            err,
            TraversalError::Resolution(ResolutionError::InvalidPattern(_))
        ));
    }

    #[test]
    fn no_regex_compiled_for_none() {
        let s = PipelineConfig::default()
            .settings_for(&Document::new("a.pdf", vec![]))
            .unwrap();
        assert!(s.regex.is_none());
    }
}
