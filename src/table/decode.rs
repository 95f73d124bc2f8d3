// src/table/decode.rs

use anyhow::{anyhow, bail, Context, Result};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, collections::BTreeMap, fmt, path::Path};
use tracing::warn;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// How the raw bytes of a file are turned into text.
///
/// In config files this is a plain string: `strict`, `relaxed`, or any
/// WHATWG encoding label (`utf-8`, `gbk`, `utf-16le`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Decoding {
    /// UTF-8, any invalid byte sequence fails the file.
    #[default]
    Strict,
    /// UTF-8 with invalid sequences replaced by U+FFFD.
    Relaxed,
    /// Explicit encoding, decoded through `encoding_rs`.
    Label(String),
}

impl Decoding {
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<Cow<'a, str>> {
        match self {
            Decoding::Strict => {
                let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
                std::str::from_utf8(body)
                    .map(Cow::Borrowed)
                    .map_err(|e| anyhow!("invalid UTF-8 at byte {}", e.valid_up_to()))
            }
            Decoding::Relaxed => {
                let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
                Ok(String::from_utf8_lossy(body))
            }
            Decoding::Label(label) => {
                let encoding = lookup(label)?;
                // `decode` sniffs and strips a BOM before falling back to `encoding`
                let (text, used, had_errors) = encoding.decode(bytes);
                if had_errors {
                    warn!(
                        encoding = used.name(),
                        "malformed sequences replaced while decoding"
                    );
                }
                Ok(text)
            }
        }
    }
}

fn lookup(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| anyhow!("unknown encoding label `{}`", label))
}

impl TryFrom<String> for Decoding {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" => bail!("empty decoding name"),
            "strict" => Ok(Decoding::Strict),
            "relaxed" | "lossy" => Ok(Decoding::Relaxed),
            label => {
                lookup(label).with_context(|| format!("parsing decoding `{}`", s))?;
                Ok(Decoding::Label(label.to_string()))
            }
        }
    }
}

impl From<Decoding> for String {
    fn from(d: Decoding) -> Self {
        d.to_string()
    }
}

impl fmt::Display for Decoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoding::Strict => write!(f, "strict"),
            Decoding::Relaxed => write!(f, "relaxed"),
            Decoding::Label(label) => write!(f, "{}", label),
        }
    }
}

/// Per-file decoding selection: one default plus named exceptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodingPolicy {
    pub default: Decoding,
    /// Keyed by repository path or bare file name.
    pub overrides: BTreeMap<String, Decoding>,
}

impl Default for DecodingPolicy {
    fn default() -> Self {
        let mut overrides = BTreeMap::new();
        // the bilingual subtitle export does not survive the strict path
        overrides.insert(
            "subtitle_chieng.csv".to_string(),
            Decoding::Label("utf-8".to_string()),
        );
        Self {
            default: Decoding::Strict,
            overrides,
        }
    }
}

impl DecodingPolicy {
    pub fn uniform(default: Decoding) -> Self {
        Self {
            default,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, file: impl Into<String>, decoding: Decoding) -> Self {
        self.overrides.insert(file.into(), decoding);
        self
    }

    /// Exact path match wins over a bare file-name match.
    pub fn for_file(&self, file: &str) -> &Decoding {
        if let Some(d) = self.overrides.get(file) {
            return d;
        }
        Path::new(file)
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|base| self.overrides.get(base))
            .unwrap_or(&self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_rejects_invalid_utf8() {
        let err = Decoding::Strict.decode(b"name\n\xff\xfe").unwrap_err();
        assert!(err.to_string().contains("invalid UTF-8"));
    }

    #[test]
    fn strict_and_relaxed_strip_bom() -> Result<()> {
        let bytes = b"\xEF\xBB\xBFname,chinese\n";
        assert_eq!(Decoding::Strict.decode(bytes)?, "name,chinese\n");
        assert_eq!(Decoding::Relaxed.decode(bytes)?, "name,chinese\n");
        Ok(())
    }

    #[test]
    fn relaxed_replaces_bad_bytes() -> Result<()> {
        let text = Decoding::Relaxed.decode(b"a,\xffb")?;
        assert_eq!(text, "a,\u{FFFD}b");
        Ok(())
    }

    #[test]
    fn label_decodes_gbk() -> Result<()> {
        // "你好" in GBK
        let bytes = [0xC4, 0xE3, 0xBA, 0xC3];
        let text = Decoding::Label("gbk".into()).decode(&bytes)?;
        assert_eq!(text, "你好");
        Ok(())
    }

    #[test]
    fn parses_from_strings() -> Result<()> {
        assert_eq!(Decoding::try_from("Strict".to_string())?, Decoding::Strict);
        assert_eq!(Decoding::try_from("lossy".to_string())?, Decoding::Relaxed);
        assert_eq!(
            Decoding::try_from("UTF-16LE".to_string())?,
            Decoding::Label("utf-16le".into())
        );
        assert!(Decoding::try_from("klingon".to_string()).is_err());
        Ok(())
    }

    #[test]
    fn policy_prefers_exact_path_then_basename() {
        let policy = DecodingPolicy::uniform(Decoding::Strict)
            .with_override("subtitle_chieng.csv", Decoding::Relaxed)
            .with_override("raw/subtitle_chieng.csv", Decoding::Label("gbk".into()));

        assert_eq!(policy.for_file("track2.csv"), &Decoding::Strict);
        assert_eq!(policy.for_file("subtitle_chieng.csv"), &Decoding::Relaxed);
        assert_eq!(policy.for_file("other/subtitle_chieng.csv"), &Decoding::Relaxed);
        assert_eq!(
            policy.for_file("raw/subtitle_chieng.csv"),
            &Decoding::Label("gbk".into())
        );
    }

    #[test]
    fn default_policy_singles_out_subtitles() {
        let policy = DecodingPolicy::default();
        assert_eq!(policy.for_file("track1_train_disdim.csv"), &Decoding::Strict);
        assert_eq!(
            policy.for_file("subtitle_chieng.csv"),
            &Decoding::Label("utf-8".into())
        );
    }

    #[test]
    fn policy_reads_from_yaml() -> Result<()> {
        let yaml = "default: relaxed\noverrides:\n  legacy.csv: gbk\n";
        let policy: DecodingPolicy = serde_yaml::from_str(yaml)?;
        assert_eq!(policy.default, Decoding::Relaxed);
        assert_eq!(policy.for_file("legacy.csv"), &Decoding::Label("gbk".into()));
        Ok(())
    }
}
