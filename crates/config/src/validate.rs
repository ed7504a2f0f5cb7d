//! Configuration validation.
//!
//! Validates TOML configuration against the known schema, detects
//! unknown/misspelled fields, and flags settings the relay cannot work with.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use crate::schema::{CourierConfig, StagingNaming};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "webhook",
    /// "staging", "relay", "whatsapp", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "webhook.url"
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}: {}", self.severity, self.message)
        } else {
            write!(f, "{}: {}: {}", self.severity, self.path, self.message)
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    Leaf,
}

fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Struct};

    Struct(HashMap::from([
        (
            "webhook",
            Struct(HashMap::from([
                ("url", Leaf),
                ("field_name", Leaf),
                ("timeout_secs", Leaf),
            ])),
        ),
        (
            "staging",
            Struct(HashMap::from([
                ("dir", Leaf),
                ("naming", Leaf),
                ("fixed_name", Leaf),
            ])),
        ),
        (
            "relay",
            Struct(HashMap::from([("accepted_mime_types", Leaf)])),
        ),
        (
            "whatsapp",
            Struct(HashMap::from([
                ("account_id", Leaf),
                ("sidecar_port", Leaf),
                ("sidecar_dir", Leaf),
                ("auth_dir", Leaf),
                ("auto_start", Leaf),
                ("media_timeout_secs", Leaf),
            ])),
        ),
    ]))
}

/// Levenshtein edit distance.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Closest candidate within `max_distance` edits.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (*c, levenshtein(needle, c)))
        .filter(|(_, d)| *d > 0 && *d <= max_distance)
        .min_by_key(|(_, d)| *d)
        .map(|(c, _)| c)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or the discovered config file
/// if `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => crate::loader::find_config_file(),
    };

    let Some(ref actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Info,
                category: "file-ref",
                path: String::new(),
                message: "no config file found; using defaults".into(),
            }],
            config_path: None,
        };
    };

    if actual_path.extension().and_then(|e| e.to_str()) != Some("toml") {
        // Only TOML gets schema diagnostics; other formats are checked by
        // loading them.
        let diagnostics = match crate::loader::load_config(actual_path) {
            Ok(config) => {
                let mut diagnostics = Vec::new();
                check_semantics(&config, &mut diagnostics);
                diagnostics
            },
            Err(e) => vec![Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: e.to_string(),
            }],
        };
        return ValidationResult {
            diagnostics,
            config_path,
        };
    }

    match std::fs::read_to_string(actual_path) {
        Ok(content) => {
            let mut result = validate_toml_str(&crate::env_subst::substitute_env(&content));
            result.config_path = config_path;
            result
        },
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("failed to read config file: {e}"),
            }],
            config_path,
        },
    }
}

/// Validate a TOML string without file-system side effects.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let toml_value: toml::Value = match toml::from_str(toml_str) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("TOML syntax error: {e}"),
            });
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    check_unknown_fields(&toml_value, &build_schema_map(), "", &mut diagnostics);

    match toml::from_str::<CourierConfig>(toml_str) {
        Ok(config) => check_semantics(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "type-error",
            path: String::new(),
            message: format!("type error: {e}"),
        }),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_unknown_fields(
    value: &toml::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (toml::Value::Table(table), KnownKeys::Struct(fields)) = (value, schema) else {
        return;
    };
    let known_keys: Vec<&str> = fields.keys().copied().collect();
    for (key, child_value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if let Some(child_schema) = fields.get(key.as_str()) {
            check_unknown_fields(child_value, child_schema, &path, diagnostics);
            continue;
        }
        let message = match suggest(key, &known_keys, 3) {
            Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
            None => "unknown field".into(),
        };
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "unknown-field",
            path,
            message,
        });
    }
}

/// Checks on a successfully parsed config.
pub fn check_semantics(config: &CourierConfig, diagnostics: &mut Vec<Diagnostic>) {
    match url::Url::parse(&config.webhook.url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {},
        Ok(url) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "webhook",
            path: "webhook.url".into(),
            message: format!("unsupported scheme \"{}\" (expected http or https)", url.scheme()),
        }),
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "webhook",
            path: "webhook.url".into(),
            message: format!("invalid URL: {e}"),
        }),
    }

    if config.webhook.field_name.trim().is_empty() {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "webhook",
            path: "webhook.field_name".into(),
            message: "multipart field name must not be empty".into(),
        });
    } else if config.webhook.field_name != crate::schema::DEFAULT_FIELD_NAME {
        diagnostics.push(Diagnostic {
            severity: Severity::Info,
            category: "webhook",
            path: "webhook.field_name".into(),
            message: format!(
                "workflow must read the file from \"{}\" instead of \"data\"",
                config.webhook.field_name
            ),
        });
    }

    if config.webhook.timeout_secs == Some(0) {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "webhook",
            path: "webhook.timeout_secs".into(),
            message: "a zero timeout fails every upload; remove it to disable the timeout".into(),
        });
    }

    if config.relay.accepted_mime_types.is_empty() {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "relay",
            path: "relay.accepted_mime_types".into(),
            message: "no accepted media types; nothing would ever be forwarded".into(),
        });
    }
    for (i, mime) in config.relay.accepted_mime_types.iter().enumerate() {
        if !mime.contains('/') {
            diagnostics.push(Diagnostic {
                severity: Severity::Warning,
                category: "relay",
                path: format!("relay.accepted_mime_types[{i}]"),
                message: format!("\"{mime}\" is not a type/subtype media type"),
            });
        }
    }

    if config.staging.naming == StagingNaming::Fixed {
        let name = &config.staging.fixed_name;
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "staging",
                path: "staging.fixed_name".into(),
                message: "must be a plain file name".into(),
            });
        }
    }

    if config.whatsapp.sidecar_port == 0 {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "whatsapp",
            path: "whatsapp.sidecar_port".into(),
            message: "sidecar port must be non-zero".into(),
        });
    }
    if config.whatsapp.account_id.trim().is_empty() {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "whatsapp",
            path: "whatsapp.account_id".into(),
            message: "account id must not be empty".into(),
        });
    }
}
