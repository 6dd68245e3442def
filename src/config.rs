//! Per-block configuration owned by the host course.
//!
//! Blocks are read once at start-up, either from a JSON file named by
//! `SY_BLOCKS_FILE` or, for a single block, from `SY_*` environment
//! variables. Nothing here changes after the server starts.

use std::{collections::HashSet, env::VarError, fmt, path::PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::SignatureHash;

const MODULE_ID_PATTERN: &str = r"^[A-Za-z0-9_\-]+(/[A-Za-z0-9_\-]+)*$";

pub const DEFAULT_MODULE_ID: &str = "intro/intro_module";
pub const DEFAULT_MODULE_TITLE: &str = "Introduction";
pub const DEFAULT_MODULE_DESCRIPTION: &str = "Welcome to School Yourself!";
pub const DEFAULT_BASE_URL: &str = "https://schoolyourself.org";
pub const DEFAULT_PARTNER_ID: &str = "edx";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read blocks file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse blocks: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no blocks configured")]
    Empty,

    #[error("duplicate block id: {0}")]
    DuplicateBlock(String),

    #[error("block '{block_id}': invalid module id '{module_id}'")]
    InvalidModuleId { block_id: String, module_id: String },

    #[error("block '{block_id}': invalid base URL '{url}': {reason}")]
    InvalidBaseUrl {
        block_id: String,
        url: String,
        reason: String,
    },

    #[error("block '{0}': weight must be a finite, non-negative number")]
    InvalidWeight(String),

    #[error("{var}: {reason}")]
    InvalidVar { var: &'static str, reason: String },

    #[error("module id pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Lessons walk the learner through material; reviews assess mastery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Lesson,
    #[default]
    Review,
}

impl std::str::FromStr for BlockKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lesson" | "module" => Ok(BlockKind::Lesson),
            "review" => Ok(BlockKind::Review),
            other => Err(format!("unknown block kind '{other}' (expected lesson or review)")),
        }
    }
}

/// Secret shared with the partner. Redacted from `Debug` output.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct SharedKey(String);

impl SharedKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(<redacted>)")
    }
}

fn default_module_id() -> String {
    DEFAULT_MODULE_ID.into()
}
fn default_module_title() -> String {
    DEFAULT_MODULE_TITLE.into()
}
fn default_module_description() -> String {
    DEFAULT_MODULE_DESCRIPTION.into()
}
fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}
fn default_partner_id() -> String {
    DEFAULT_PARTNER_ID.into()
}
fn default_weight() -> f64 {
    1.0
}

/// Settings of one embedded School Yourself block.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockConfig {
    pub block_id: String,
    #[serde(default)]
    pub kind: BlockKind,
    /// Module id as it appears on schoolyourself.org, e.g. `geometry/lines_rays`.
    /// Doubles as the topic id graded out of the mastery map.
    #[serde(default = "default_module_id")]
    pub module_id: String,
    #[serde(default = "default_module_title")]
    pub module_title: String,
    #[serde(default = "default_module_description")]
    pub module_description: String,
    /// Base URL for the iframe, without query parameters.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub shared_key: SharedKey,
    #[serde(default)]
    pub signature_hash: SignatureHash,
    /// Defaults to `true` for reviews and `false` for lessons.
    #[serde(default)]
    pub has_score: Option<bool>,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_partner_id")]
    pub partner_id: String,
}

impl BlockConfig {
    /// A block with every optional setting at its default.
    pub fn new(block_id: impl Into<String>, kind: BlockKind) -> Self {
        Self {
            block_id: block_id.into(),
            kind,
            module_id: default_module_id(),
            module_title: default_module_title(),
            module_description: default_module_description(),
            base_url: default_base_url(),
            shared_key: SharedKey::default(),
            signature_hash: SignatureHash::default(),
            has_score: None,
            weight: default_weight(),
            partner_id: default_partner_id(),
        }
    }

    pub fn has_score(&self) -> bool {
        self.has_score.unwrap_or(self.kind == BlockKind::Review)
    }

    pub fn display_name(&self) -> String {
        match self.kind {
            BlockKind::Lesson => self.module_title.clone(),
            BlockKind::Review => format!("Review: {}", self.module_title),
        }
    }

    pub fn validate(&self, module_id_re: &Regex) -> Result<(), ConfigError> {
        if !module_id_re.is_match(&self.module_id) {
            return Err(ConfigError::InvalidModuleId {
                block_id: self.block_id.clone(),
                module_id: self.module_id.clone(),
            });
        }

        let bad_url = |reason: String| ConfigError::InvalidBaseUrl {
            block_id: self.block_id.clone(),
            url: self.base_url.clone(),
            reason,
        };
        let url = Url::parse(&self.base_url).map_err(|e| bad_url(e.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(bad_url("scheme must be http or https".into()));
        }
        if url.query().is_some() {
            return Err(bad_url("URL params are added per launch; remove the query string".into()));
        }

        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(ConfigError::InvalidWeight(self.block_id.clone()));
        }

        Ok(())
    }
}

/// Validate a full set of blocks: each block individually, plus unique ids.
pub fn validate_blocks(blocks: &[BlockConfig]) -> Result<(), ConfigError> {
    if blocks.is_empty() {
        return Err(ConfigError::Empty);
    }
    let module_id_re = Regex::new(MODULE_ID_PATTERN)?;
    let mut seen = HashSet::new();
    for block in blocks {
        if !seen.insert(block.block_id.as_str()) {
            return Err(ConfigError::DuplicateBlock(block.block_id.clone()));
        }
        block.validate(&module_id_re)?;
        if block.shared_key.is_empty() && block.has_score() {
            tracing::warn!(
                "Block '{}' has no shared key — grade callbacks will be refused",
                block.block_id
            );
        }
    }
    Ok(())
}

/// Parse and validate the contents of a blocks file (a JSON array).
pub fn parse_blocks(json: &str) -> Result<Vec<BlockConfig>, ConfigError> {
    let blocks: Vec<BlockConfig> = serde_json::from_str(json)?;
    validate_blocks(&blocks)?;
    Ok(blocks)
}

/// Build a single block from `SY_*` variables looked up through `var`.
pub fn block_from_vars(var: impl Fn(&str) -> Option<String>) -> Result<BlockConfig, ConfigError> {
    let kind = match var("SY_BLOCK_KIND") {
        Some(k) => k
            .parse()
            .map_err(|reason| ConfigError::InvalidVar { var: "SY_BLOCK_KIND", reason })?,
        None => BlockKind::default(),
    };

    let mut block = BlockConfig::new(var("SY_BLOCK_ID").unwrap_or_else(|| "default".into()), kind);
    if let Some(v) = var("SY_MODULE_ID") {
        block.module_id = v;
    }
    if let Some(v) = var("SY_MODULE_TITLE") {
        block.module_title = v;
    }
    if let Some(v) = var("SY_MODULE_DESCRIPTION") {
        block.module_description = v;
    }
    if let Some(v) = var("SY_BASE_URL") {
        block.base_url = v;
    }
    if let Some(v) = var("SY_SHARED_KEY") {
        block.shared_key = SharedKey::new(v);
    }
    if let Some(v) = var("SY_SIGNATURE_HASH") {
        block.signature_hash = v
            .parse()
            .map_err(|reason| ConfigError::InvalidVar { var: "SY_SIGNATURE_HASH", reason })?;
    }
    if let Some(v) = var("SY_PARTNER_ID") {
        block.partner_id = v;
    }
    Ok(block)
}

/// Interpret the `SY_BLOCKS_FILE` lookup. Unset means single-block mode.
fn blocks_file(var: Result<String, VarError>) -> Result<Option<PathBuf>, ConfigError> {
    match var {
        Ok(path) => Ok(Some(PathBuf::from(path))),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(raw)) => Err(ConfigError::InvalidVar {
            var: "SY_BLOCKS_FILE",
            reason: format!("not valid UTF-8: {raw:?}"),
        }),
    }
}

/// Load blocks from `SY_BLOCKS_FILE` if set, otherwise from `SY_*` variables.
pub fn load_blocks() -> Result<Vec<BlockConfig>, ConfigError> {
    match blocks_file(std::env::var("SY_BLOCKS_FILE"))? {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .map_err(|source| ConfigError::Io { path: path.clone(), source })?;
            let blocks = parse_blocks(&json)?;
            tracing::info!("Loaded {} block(s) from {}", blocks.len(), path.display());
            Ok(blocks)
        }
        None => {
            let block = block_from_vars(|name| std::env::var(name).ok())?;
            let blocks = vec![block];
            validate_blocks(&blocks)?;
            tracing::info!("SY_BLOCKS_FILE not set — serving single block from environment");
            Ok(blocks)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn file_blocks_get_defaults() {
        let blocks = parse_blocks(r#"[{ "block_id": "r1" }, { "block_id": "l1", "kind": "lesson" }]"#)
            .unwrap();

        let review = &blocks[0];
        assert_eq!(review.kind, BlockKind::Review);
        assert_eq!(review.module_id, DEFAULT_MODULE_ID);
        assert_eq!(review.base_url, DEFAULT_BASE_URL);
        assert_eq!(review.partner_id, DEFAULT_PARTNER_ID);
        assert_eq!(review.signature_hash, SignatureHash::Sha256);
        assert!(review.shared_key.is_empty());
        assert!(review.has_score());
        assert_eq!(review.weight, 1.0);

        assert!(!blocks[1].has_score());
    }

    #[test]
    fn explicit_settings_are_read() {
        let blocks = parse_blocks(
            r#"[{
                "block_id": "mult",
                "module_id": "algebra/multiplication",
                "module_title": "Multiplication",
                "base_url": "https://dev.schoolyourself.org/review",
                "shared_key": "key",
                "signature_hash": "md5",
                "has_score": false,
                "weight": 2.5
            }]"#,
        )
        .unwrap();
        let b = &blocks[0];
        assert_eq!(b.module_id, "algebra/multiplication");
        assert_eq!(b.shared_key.expose(), "key");
        assert_eq!(b.signature_hash, SignatureHash::Md5);
        assert!(!b.has_score());
        assert_eq!(b.weight, 2.5);
    }

    #[test]
    fn display_name_depends_on_kind() {
        let mut block = BlockConfig::new("b", BlockKind::Review);
        block.module_title = "blah".into();
        assert_eq!(block.display_name(), "Review: blah");
        block.kind = BlockKind::Lesson;
        assert_eq!(block.display_name(), "blah");
    }

    #[test]
    fn shared_key_is_redacted_in_debug() {
        let mut block = BlockConfig::new("b", BlockKind::Review);
        block.shared_key = SharedKey::new("super-secret");
        let debug = format!("{block:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn rejects_bad_module_ids() {
        for bad in ["", "/lines", "geometry/", "geometry lines", "a//b", "x?y"] {
            let json = format!(r#"[{{ "block_id": "b", "module_id": "{bad}" }}]"#);
            assert!(
                matches!(parse_blocks(&json), Err(ConfigError::InvalidModuleId { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_bad_base_urls() {
        for bad in ["not a url", "ftp://schoolyourself.org", "https://schoolyourself.org/?id=1"] {
            let json = format!(r#"[{{ "block_id": "b", "base_url": "{bad}" }}]"#);
            assert!(
                matches!(parse_blocks(&json), Err(ConfigError::InvalidBaseUrl { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_duplicates_and_empty_sets() {
        assert!(matches!(
            parse_blocks(r#"[{ "block_id": "a" }, { "block_id": "a" }]"#),
            Err(ConfigError::DuplicateBlock(id)) if id == "a"
        ));
        assert!(matches!(parse_blocks("[]"), Err(ConfigError::Empty)));
        assert!(matches!(parse_blocks("{}"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn rejects_negative_weight() {
        assert!(matches!(
            parse_blocks(r#"[{ "block_id": "a", "weight": -1 }]"#),
            Err(ConfigError::InvalidWeight(_))
        ));
    }

    #[test]
    fn builds_block_from_vars() {
        let vars: HashMap<&str, &str> = [
            ("SY_BLOCK_ID", "mult"),
            ("SY_BLOCK_KIND", "lesson"),
            ("SY_MODULE_ID", "algebra/multiplication"),
            ("SY_SHARED_KEY", "key"),
            ("SY_SIGNATURE_HASH", "MD5"),
        ]
        .into_iter()
        .collect();

        let block = block_from_vars(|name| vars.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(block.block_id, "mult");
        assert_eq!(block.kind, BlockKind::Lesson);
        assert_eq!(block.module_id, "algebra/multiplication");
        assert_eq!(block.shared_key.expose(), "key");
        assert_eq!(block.signature_hash, SignatureHash::Md5);
        assert_eq!(block.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn unknown_var_values_are_errors() {
        let err = block_from_vars(|name| (name == "SY_SIGNATURE_HASH").then(|| "sha1".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVar { var: "SY_SIGNATURE_HASH", .. }));

        let err = block_from_vars(|name| (name == "SY_BLOCK_KIND").then(|| "quiz".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVar { var: "SY_BLOCK_KIND", .. }));
    }

    #[test]
    fn non_unicode_blocks_file_is_an_error() {
        assert_eq!(blocks_file(Err(VarError::NotPresent)).unwrap(), None);
        assert_eq!(
            blocks_file(Ok("/etc/sy/blocks.json".into())).unwrap(),
            Some(PathBuf::from("/etc/sy/blocks.json"))
        );

        let err = blocks_file(Err(VarError::NotUnicode("blocks.json".into()))).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVar { var: "SY_BLOCKS_FILE", .. }));
    }
}
