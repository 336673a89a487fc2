//! Normalization of the file names produced by the separator.
//!
//! The separator decorates every stem with the model name and a
//! parenthesized stem marker, e.g. `song_(Vocals)_UVR-MDX-NET-Inst_HQ_3.wav`.
//! An ordered list of [`FilenameRule`]s reduces that to `song-Vocals.wav`.
//!
//! Rules only ever shorten a name and are re-applied until nothing changes,
//! so `clean(clean(x)) == clean(x)` holds for every input.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::separator::normalize_model;

/// Stem names the separator marks with parentheses.
pub const STEM_NAMES: &[&str] = &["Vocals", "Instrumental", "Drums", "Bass", "Other"];

static STEM_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[_\- ]*\((Vocals|Instrumental|Drums|Bass|Other)\)").expect("valid regex")
});

static SEPARATOR_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[_\- ]{2,}").expect("valid regex"));

fn is_separator(c: char) -> bool {
    matches!(c, '_' | '-' | ' ' | '.')
}

/// One deterministic rewrite step applied to a file stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilenameRule {
    /// `<token>_song` -> `song`
    LeadingToken,
    /// `song_<token>` -> `song`
    TrailingToken,
    /// `so<token>ng` -> `song`
    BareToken,
    /// `song (Vocals)` / `song_(Vocals)` -> `song-Vocals`
    StemMarker,
    /// `song__x` -> `song_x`, `song_-Vocals` -> `song-Vocals`
    CollapseSeparators,
    /// `_song-` -> `song`
    TrimSeparators,
}

/// Rules in application order.
pub const RULES: &[FilenameRule] = &[
    FilenameRule::LeadingToken,
    FilenameRule::TrailingToken,
    FilenameRule::BareToken,
    FilenameRule::StemMarker,
    FilenameRule::CollapseSeparators,
    FilenameRule::TrimSeparators,
];

impl FilenameRule {
    /// Apply this rule to `stem`. Token rules are no-ops without a token.
    pub fn apply(self, stem: &str, token: Option<&str>) -> String {
        match (self, token.filter(|t| !t.is_empty())) {
            (Self::LeadingToken, Some(token)) => stem
                .strip_prefix(token)
                .and_then(|rest| {
                    let mut chars = rest.chars();
                    chars.next().filter(|c| is_separator(*c)).map(|_| chars.as_str())
                })
                .unwrap_or(stem)
                .to_string(),
            (Self::TrailingToken, Some(token)) => stem
                .strip_suffix(token)
                .and_then(|rest| {
                    let mut chars = rest.chars();
                    chars
                        .next_back()
                        .filter(|c| is_separator(*c))
                        .map(|_| chars.as_str())
                })
                .unwrap_or(stem)
                .to_string(),
            (Self::BareToken, Some(token)) => stem.replace(token, ""),
            (Self::LeadingToken | Self::TrailingToken | Self::BareToken, None) => stem.to_string(),
            (Self::StemMarker, _) => STEM_MARKER.replace_all(stem, "-$1").into_owned(),
            (Self::CollapseSeparators, _) => SEPARATOR_RUN
                .replace_all(stem, |caps: &regex::Captures<'_>| {
                    caps[0].chars().last().map(String::from).unwrap_or_default()
                })
                .into_owned(),
            (Self::TrimSeparators, _) => stem.trim_matches(is_separator).to_string(),
        }
    }
}

/// Token the separator embeds in its output names: the model file name
/// without extension.
pub fn model_token(model: Option<&str>) -> Option<String> {
    let model = normalize_model(model)?;
    let stem = Path::new(&model).file_stem()?.to_string_lossy().into_owned();
    (!stem.is_empty()).then_some(stem)
}

/// Split `name` into stem and extension (`None` for dotfiles or no dot).
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

/// Clean a single file name. Falls back to `name` if nothing would remain.
pub fn clean_filename(name: &str, token: Option<&str>) -> String {
    let (stem, ext) = split_extension(name);

    let mut current = stem.to_string();
    loop {
        let next = RULES
            .iter()
            .fold(current.clone(), |acc, rule| rule.apply(&acc, token));
        if next == current {
            break;
        }
        current = next;
    }

    if current.is_empty() {
        return name.to_string();
    }
    match ext {
        Some(ext) => format!("{current}.{ext}"),
        None => current,
    }
}

/// Rename the produced files in `dir` to their cleaned names.
///
/// Returns the final names, sorted. Any name whose cleaned form would clash
/// with another file of the job keeps its original name; rename failures
/// are logged and also keep the original.
pub async fn normalize_outputs(dir: &Path, files: Vec<String>, model: Option<&str>) -> Vec<String> {
    let token = model_token(model);

    let planned: Vec<(String, String)> = files
        .into_iter()
        .map(|orig| {
            let cleaned = clean_filename(&orig, token.as_deref());
            (orig, cleaned)
        })
        .collect();

    let mut target_counts: HashMap<&str, usize> = HashMap::new();
    for (_, cleaned) in &planned {
        *target_counts.entry(cleaned.as_str()).or_default() += 1;
    }

    let mut result = Vec::with_capacity(planned.len());
    for (orig, cleaned) in &planned {
        if orig == cleaned {
            result.push(orig.clone());
            continue;
        }
        if target_counts[cleaned.as_str()] > 1 {
            tracing::warn!(file = %orig, target = %cleaned, "Cleaned name collides, keeping original");
            result.push(orig.clone());
            continue;
        }

        let target = dir.join(cleaned);
        if tokio::fs::try_exists(&target).await.unwrap_or(true) {
            tracing::warn!(file = %orig, target = %cleaned, "Target already exists, keeping original");
            result.push(orig.clone());
            continue;
        }

        match tokio::fs::rename(dir.join(orig), &target).await {
            Ok(()) => {
                tracing::debug!(from = %orig, to = %cleaned, "Renamed output file");
                result.push(cleaned.clone());
            }
            Err(e) => {
                tracing::warn!(file = %orig, error = %e, "Failed to rename output file");
                result.push(orig.clone());
            }
        }
    }

    result.sort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = "UVR-MDX-NET-Inst_HQ_3";

    #[test]
    fn leading_token_rule() {
        let r = FilenameRule::LeadingToken;
        assert_eq!(r.apply("M_song", Some("M")), "song");
        assert_eq!(r.apply("M-song", Some("M")), "song");
        // Not a segment: token glued to the next word.
        assert_eq!(r.apply("Msong", Some("M")), "Msong");
    }

    #[test]
    fn trailing_token_rule() {
        let r = FilenameRule::TrailingToken;
        assert_eq!(r.apply(&format!("song_(Vocals)_{MODEL}"), Some(MODEL)), "song_(Vocals)");
        assert_eq!(r.apply("songM", Some("M")), "songM");
    }

    #[test]
    fn bare_token_rule() {
        assert_eq!(FilenameRule::BareToken.apply("aXYZb", Some("XYZ")), "ab");
        assert_eq!(FilenameRule::BareToken.apply("aXYZb", None), "aXYZb");
    }

    #[test]
    fn stem_marker_rule() {
        let r = FilenameRule::StemMarker;
        assert_eq!(r.apply("song (Vocals)", None), "song-Vocals");
        assert_eq!(r.apply("song_(Instrumental)", None), "song-Instrumental");
        assert_eq!(r.apply("song(Drums)", None), "song-Drums");
        assert_eq!(r.apply("song (Guitar)", None), "song (Guitar)");
    }

    #[test]
    fn collapse_separators_rule() {
        let r = FilenameRule::CollapseSeparators;
        assert_eq!(r.apply("a__b", None), "a_b");
        assert_eq!(r.apply("a  b", None), "a b");
        assert_eq!(r.apply("song_-Vocals", None), "song-Vocals");
    }

    #[test]
    fn trim_separators_rule() {
        assert_eq!(FilenameRule::TrimSeparators.apply("_song-", None), "song");
    }

    #[test]
    fn scenario_names() {
        assert_eq!(clean_filename("M_song (Vocals).wav", Some("M")), "song-Vocals.wav");
        assert_eq!(
            clean_filename("M_song (Instrumental).wav", Some("M")),
            "song-Instrumental.wav"
        );
    }

    #[test]
    fn separator_output_name() {
        let name = format!("track_(Vocals)_{MODEL}.flac");
        assert_eq!(clean_filename(&name, Some(MODEL)), "track-Vocals.flac");
    }

    #[test]
    fn clean_is_idempotent() {
        let names = [
            "M_song (Vocals).wav",
            "song-Vocals.wav",
            "__weird__name__.mp3",
            "M_M_(Bass).wav",
            "noext",
            ".hidden",
            "M.wav",
            "a - (Other) - b.ogg",
        ];
        for name in names {
            let once = clean_filename(name, Some("M"));
            assert_eq!(clean_filename(&once, Some("M")), once, "not idempotent for {name}");
        }
    }

    #[test]
    fn empty_result_keeps_original() {
        assert_eq!(clean_filename("M.wav", Some("M")), "M.wav");
    }

    #[test]
    fn model_token_strips_extension() {
        assert_eq!(model_token(Some("Kim_Vocal_2.onnx")), Some("Kim_Vocal_2".to_string()));
        assert_eq!(model_token(Some("default")), None);
        assert_eq!(model_token(None), None);
    }

    #[tokio::test]
    async fn renames_files_in_place() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["M_song (Vocals).wav", "M_song (Instrumental).wav"] {
            std::fs::write(dir.path().join(name), b"pcm").expect("write");
        }

        let files = vec![
            "M_song (Vocals).wav".to_string(),
            "M_song (Instrumental).wav".to_string(),
        ];
        let result = normalize_outputs(dir.path(), files, Some("M.onnx")).await;

        assert_eq!(result, vec!["song-Instrumental.wav", "song-Vocals.wav"]);
        assert!(dir.path().join("song-Vocals.wav").exists());
        assert!(!dir.path().join("M_song (Vocals).wav").exists());
    }

    #[tokio::test]
    async fn collision_keeps_original_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["M_song (Vocals).wav", "song_(Vocals)_M.wav"] {
            std::fs::write(dir.path().join(name), b"pcm").expect("write");
        }

        let files = vec![
            "M_song (Vocals).wav".to_string(),
            "song_(Vocals)_M.wav".to_string(),
        ];
        let result = normalize_outputs(dir.path(), files, Some("M.onnx")).await;

        assert_eq!(result, vec!["M_song (Vocals).wav", "song_(Vocals)_M.wav"]);
        assert!(dir.path().join("M_song (Vocals).wav").exists());
        assert!(dir.path().join("song_(Vocals)_M.wav").exists());
    }
}
