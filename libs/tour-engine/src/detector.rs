/// Version Detectors - pure pattern matching over paths and source text
///
/// Lesson files live under `releases/v/<major.minor>/`, so a path (or a path
/// mentioned inside the source) is the most reliable signal. Comment sniffing
/// is a fallback and only ever takes the first match of a pattern.

use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tour_common::VersionToken;

lazy_static! {
    static ref RELEASE_PATH: Regex = Regex::new(r"releases/v/(\d+\.\d+)/").unwrap();
    // "// Go 1.24 新機能: ..." or "// Go 1.18 generics"
    static ref QUALIFIED_COMMENT: Regex = Regex::new(r"//.*Go\s+(\d+\.\d+)[\s新機能:]").unwrap();
    static ref LOOSE_COMMENT: Regex = Regex::new(r"//.*Go\s+(\d+\.\d+)").unwrap();
    static ref LEGACY_TAG: Regex = Regex::new(r"//\s*GO_VERSION:\s*(\d+\.\d+)").unwrap();
}

/// Which source-text pattern produced a version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeSignal {
    EmbeddedPath,
    QualifiedComment,
    LooseComment,
    LegacyTag,
}

/// First capture of `pattern`, accepted only if it is a well-formed token
fn first_token(pattern: &Regex, text: &str) -> Option<VersionToken> {
    pattern
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
}

/// Extract the version segment of a `releases/v/<x.y>/` path
pub fn version_from_path(path: &str) -> Option<VersionToken> {
    if path.is_empty() {
        return None;
    }
    first_token(&RELEASE_PATH, &path.replace('\\', "/"))
}

/// Sniff a version from source text, trying each pattern in turn
pub fn version_from_code(code: &str) -> Option<(VersionToken, CodeSignal)> {
    let tiers: [(&Regex, CodeSignal); 4] = [
        (&RELEASE_PATH, CodeSignal::EmbeddedPath),
        (&QUALIFIED_COMMENT, CodeSignal::QualifiedComment),
        (&LOOSE_COMMENT, CodeSignal::LooseComment),
        (&LEGACY_TAG, CodeSignal::LegacyTag),
    ];

    tiers
        .into_iter()
        .find_map(|(pattern, signal)| first_token(pattern, code).map(|token| (token, signal)))
}

/// `"1.18/01_generics"` -> `1.18`
pub fn version_from_lesson_id(lesson_id: &str) -> Option<VersionToken> {
    lesson_id.split('/').next()?.parse().ok()
}

/// `"1.18"` or `"releases/v/1.18"` -> `1.18`
pub fn version_from_directory(dir: &Path) -> Option<VersionToken> {
    if let Some(token) = dir
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.parse().ok())
    {
        return Some(token);
    }
    version_from_path(&dir.to_string_lossy())
}

pub fn build_lesson_path(version: &VersionToken, filename: &str) -> String {
    format!("releases/v/{}/{}", version, filename)
}

/// A lesson file located by its path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonInfo {
    pub version: VersionToken,
    pub filename: String,
    pub lesson_name: String,
    pub full_path: PathBuf,
}

pub fn parse_lesson_path(path: &Path) -> Option<LessonInfo> {
    let version = version_from_path(&path.to_string_lossy())?;
    let filename = path.file_name()?.to_string_lossy().into_owned();
    let lesson_name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.clone());

    Some(LessonInfo {
        version,
        filename,
        lesson_name,
        full_path: path.to_path_buf(),
    })
}

/// Versions with a lesson directory under `<releases_dir>/v/`, newest first
pub fn versions_in_releases(releases_dir: &Path) -> std::io::Result<Vec<VersionToken>> {
    let mut versions: Vec<VersionToken> = fs::read_dir(releases_dir.join("v"))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| version_from_directory(&entry.path()))
        .collect();

    versions.sort_unstable_by(|a, b| b.cmp(a));
    Ok(versions)
}
