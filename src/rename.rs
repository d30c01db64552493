//! Title → filename, and collision-safe renaming of a file with its sidecars.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::ledger::LEDGER_FILE_NAME;

const RESERVED: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|', '「', '」'];

/// Turn a caption into a filename stem: drop characters that are reserved
/// on common filesystems (and Japanese corner brackets), trim, and replace
/// spaces with underscores.
pub fn sanitize_title(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| !RESERVED.contains(c) && !c.is_control())
        .collect();
    kept.trim().replace(' ', "_")
}

/// Guess a place name from a filename: the stem without digits, trimmed of
/// whitespace and `_`/`-` separators. `"Paris01.jpg"` → `"Paris"`.
pub fn place_from_filename(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    stem.chars()
        .filter(|c| !c.is_ascii_digit())
        .collect::<String>()
        .trim_matches(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .to_string()
}

/// First free path among `stem.ext`, `stem_1.ext`, `stem_2.ext`, …
///
/// `ext` is given without the dot and may be empty.
pub fn unique_target(folder: &Path, stem: &str, ext: &str) -> PathBuf {
    let candidate = |suffix: Option<u32>| {
        let base = match suffix {
            Some(n) => format!("{stem}_{n}"),
            None => stem.to_string(),
        };
        if ext.is_empty() {
            folder.join(base)
        } else {
            folder.join(format!("{base}.{ext}"))
        }
    };

    let mut path = candidate(None);
    let mut n = 1;
    while path.exists() {
        path = candidate(Some(n));
        n += 1;
    }
    path
}

/// One completed rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renamed {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Rename every file in `folder` whose stem is `old_stem` to `new_stem`
/// with its own extension. Each sibling gets its own collision suffix, so
/// nothing existing is ever overwritten. The ledger file is left alone.
pub fn rename_siblings(folder: &Path, old_stem: &str, new_stem: &str) -> Result<Vec<Renamed>> {
    let mut siblings: Vec<PathBuf> = std::fs::read_dir(folder)
        .with_context(|| format!("Failed to list {}", folder.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| p.file_name().is_some_and(|n| n != LEDGER_FILE_NAME))
        .filter(|p| p.file_stem().is_some_and(|s| s == old_stem))
        .collect();
    siblings.sort();

    let mut done = Vec::with_capacity(siblings.len());
    for from in siblings {
        let ext = from
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let to = unique_target(folder, new_stem, &ext);
        std::fs::rename(&from, &to)
            .with_context(|| format!("Failed to rename {} to {}", from.display(), to.display()))?;
        log::debug!("Renamed {} -> {}", from.display(), to.display());
        done.push(Renamed { from, to });
    }
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn names(dir: &Path) -> Vec<String> {
        let mut v: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        v.sort();
        v
    }

    // ── sanitize_title ───────────────────────────────────────────────

    #[test]
    fn sanitize_removes_reserved_characters() {
        let s = sanitize_title("My:Title/2024");
        assert!(!s.contains(['\\', '/', ':', '*', '?', '"', '<', '>', '|']));
        assert_eq!(s, "MyTitle2024");
    }

    #[test]
    fn sanitize_all_reserved() {
        let s = sanitize_title(r#"a\b/c:d*e?f"g<h>i|j"#);
        assert_eq!(s, "abcdefghij");
    }

    #[test]
    fn sanitize_spaces_and_brackets() {
        assert_eq!(sanitize_title("「Quiet Harbor at Dawn」"), "Quiet_Harbor_at_Dawn");
        assert_eq!(sanitize_title("  夕暮れの橋 "), "夕暮れの橋");
    }

    // ── place_from_filename ──────────────────────────────────────────

    #[test]
    fn place_strips_digits() {
        assert_eq!(place_from_filename("Paris01.jpg"), "Paris");
        assert_eq!(place_from_filename("Kyoto_2023-05.JPG"), "Kyoto");
        assert_eq!(place_from_filename("New York 12.jpg"), "New York");
    }

    #[test]
    fn place_empty_for_numeric_names() {
        assert_eq!(place_from_filename("IMG0001.jpg"), "IMG");
        assert_eq!(place_from_filename("20240101_123456.jpg"), "");
    }

    // ── unique_target ────────────────────────────────────────────────

    #[test]
    fn unique_target_free_name() {
        let dir = TempDir::new().unwrap();
        assert_eq!(unique_target(dir.path(), "橋", "jpg"), dir.path().join("橋.jpg"));
    }

    #[test]
    fn unique_target_suffixes_until_free() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("橋.jpg"), b"1").unwrap();
        fs::write(dir.path().join("橋_1.jpg"), b"2").unwrap();

        let target = unique_target(dir.path(), "橋", "jpg");
        assert_eq!(target, dir.path().join("橋_2.jpg"));
        assert!(!target.exists());
    }

    #[test]
    fn unique_target_without_extension() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes"), b"").unwrap();
        assert_eq!(unique_target(dir.path(), "notes", ""), dir.path().join("notes_1"));
    }

    // ── rename_siblings ──────────────────────────────────────────────

    #[test]
    fn renames_jpeg_and_sidecars() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Paris01.jpg"), b"img").unwrap();
        fs::write(dir.path().join("Paris01.xmp"), b"xmp").unwrap();
        fs::write(dir.path().join("Paris012.jpg"), b"other").unwrap();

        let done = rename_siblings(dir.path(), "Paris01", "橋").unwrap();
        assert_eq!(done.len(), 2);
        assert_eq!(names(dir.path()), vec!["Paris012.jpg", "橋.jpg", "橋.xmp"]);
        assert_eq!(fs::read(dir.path().join("橋.xmp")).unwrap(), b"xmp");
    }

    #[test]
    fn never_overwrites_existing_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("橋.jpg"), b"unrelated").unwrap();
        fs::write(dir.path().join("Paris01.jpg"), b"mine").unwrap();

        rename_siblings(dir.path(), "Paris01", "橋").unwrap();

        assert_eq!(fs::read(dir.path().join("橋.jpg")).unwrap(), b"unrelated");
        assert_eq!(fs::read(dir.path().join("橋_1.jpg")).unwrap(), b"mine");
    }

    #[test]
    fn ledger_is_never_a_sibling() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("log.jpg"), b"img").unwrap();
        fs::write(dir.path().join(LEDGER_FILE_NAME), b"ledger").unwrap();

        rename_siblings(dir.path(), "log", "titled").unwrap();
        assert_eq!(names(dir.path()), vec!["log.csv", "titled.jpg"]);
    }
}
