/// Safety Validator - textual checks run before any process exists
///
/// **This is not a sandbox.** The deny list is a heuristic filter that stops
/// the obvious cases (deleting files, spawning processes, raw memory access,
/// symbol linking). Anything that needs real isolation must come from the
/// environment the runner is deployed in (unprivileged user, container,
/// resource limits).

use crate::error::{ExecError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use tour_common::VersionToken;

/// Matched case-insensitively, in this order
pub const DENY_LIST: &[&str] = &[
    "os.RemoveAll",
    "os.Remove",
    "exec.Command",
    "syscall",
    "unsafe",
    "//go:linkname",
];

/// Minimum Go version per named language/library feature
const FEATURE_REQUIREMENTS: &[(&str, VersionToken)] = &[
    ("generics", VersionToken::new(1, 18)),
    ("workspace", VersionToken::new(1, 18)),
    ("type-parameters", VersionToken::new(1, 18)),
    ("atomic-types", VersionToken::new(1, 19)),
    ("memory-arenas", VersionToken::new(1, 19)),
    ("comparable-types", VersionToken::new(1, 20)),
    ("slice-to-array", VersionToken::new(1, 20)),
    ("errors-join", VersionToken::new(1, 20)),
    ("builtin-functions", VersionToken::new(1, 21)),
    ("slices-package", VersionToken::new(1, 21)),
    ("maps-package", VersionToken::new(1, 21)),
    ("for-range-int", VersionToken::new(1, 22)),
    ("enhanced-routing", VersionToken::new(1, 22)),
    ("loop-variables", VersionToken::new(1, 22)),
    ("structured-logging", VersionToken::new(1, 23)),
    ("iterators", VersionToken::new(1, 23)),
    ("generic-aliases", VersionToken::new(1, 24)),
    ("swiss-tables", VersionToken::new(1, 24)),
    ("weak-pointers", VersionToken::new(1, 24)),
    ("container-gomaxprocs", VersionToken::new(1, 25)),
    ("synctest", VersionToken::new(1, 25)),
    ("json-v2", VersionToken::new(1, 25)),
];

/// `None` for features we know nothing about; those are treated as supported.
pub fn feature_requirement(feature: &str) -> Option<VersionToken> {
    FEATURE_REQUIREMENTS
        .iter()
        .find(|(name, _)| *name == feature)
        .map(|(_, version)| *version)
}

struct SyntaxFeature {
    feature: &'static str,
    patterns: Vec<Regex>,
}

lazy_static! {
    /// Syntax detectable from source text alone, checked in this order
    static ref SYNTAX_FEATURES: Vec<SyntaxFeature> = vec![
        SyntaxFeature {
            feature: "generics",
            patterns: vec![
                Regex::new(r"\[\s*T\s+(any|comparable)\s*\]").unwrap(),
                Regex::new(r"\[\s*T\s+constraint").unwrap(),
                // Constraint must start like a type, so `[N + 1]` array lengths don't match
                Regex::new(r"(func\s+\w+|type\s+\w+)\s*\[\s*\w+(\s*,\s*\w+)*\s+[\w~\[][^\]]*\]").unwrap(),
            ],
        },
        SyntaxFeature {
            feature: "for-range-int",
            patterns: vec![Regex::new(r"for\s+(\w+\s*:=\s*)?range\s+\d+\b").unwrap()],
        },
        SyntaxFeature {
            feature: "generic-aliases",
            patterns: vec![Regex::new(r"type\s+\w+\s*\[[^\]]+\]\s*=").unwrap()],
        },
    ];
}

/// First deny-listed token present in `code`, ignoring case
pub fn find_forbidden(code: &str) -> Option<&'static str> {
    let lowered = code.to_lowercase();
    DENY_LIST
        .iter()
        .copied()
        .find(|token| lowered.contains(&token.to_lowercase()))
}

/// Syntax features used by `code` that `version` is too old for
pub fn unsupported_syntax(code: &str, version: &VersionToken) -> Option<(&'static str, VersionToken)> {
    SYNTAX_FEATURES.iter().find_map(|syntax| {
        let required = feature_requirement(syntax.feature)?;
        if *version >= required {
            return None;
        }
        syntax
            .patterns
            .iter()
            .any(|pattern| pattern.is_match(code))
            .then_some((syntax.feature, required))
    })
}

/// Run every check; the first failure wins
pub fn validate(code: &str, version: &VersionToken) -> Result<()> {
    if code.trim().is_empty() {
        return Err(ExecError::EmptySource);
    }

    if let Some(token) = find_forbidden(code) {
        return Err(ExecError::ForbiddenConstruct {
            token: token.to_string(),
        });
    }

    if let Some((feature, required)) = unsupported_syntax(code, version) {
        return Err(ExecError::VersionFeatureMismatch {
            feature: feature.to_string(),
            required,
            resolved: *version,
        });
    }

    Ok(())
}
