//! Input loading for the CLI
//!
//! Photos come from a directory, notes from a free-text file. Neither is part
//! of the pipeline contract; the orchestrator only sees `Photo` and
//! `ObservationNote` values.

use crate::pipeline::tier1::note_parser::ordinal_prefix;
use crate::pipeline::types::{ObservationNote, Photo};
use insp_common::{Error, Result};
use std::path::Path;

/// Supported image extensions and their MIME types
const IMAGE_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("webp", "image/webp"),
    ("heic", "image/heic"),
];

/// MIME type for a supported image path (case-insensitive extension)
pub fn mime_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    IMAGE_TYPES
        .iter()
        .find(|(candidate, _)| *candidate == ext)
        .map(|(_, mime)| *mime)
}

/// Load every supported image in `dir`, sorted by filename, ids from 1
pub fn load_photos(dir: &Path) -> Result<Vec<Photo>> {
    if !dir.is_dir() {
        return Err(Error::InvalidInput(format!(
            "Photo directory not found: {}",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        match mime_type_for(&path) {
            Some(mime) => files.push((path, mime)),
            None => tracing::debug!(path = %path.display(), "Skipping non-image file"),
        }
    }
    files.sort_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));

    let mut photos = Vec::with_capacity(files.len());
    for (index, (path, mime)) in files.into_iter().enumerate() {
        let content = std::fs::read(&path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        photos.push(Photo::new(index as u32 + 1, filename, mime, content));
    }

    tracing::info!(dir = %dir.display(), photos = photos.len(), "Photos loaded");
    Ok(photos)
}

/// Split a notes file into observation notes
///
/// Lines starting with an ordinal prefix ("1.", "2)", "Note 3", ...) open a
/// note with that number as id; following lines continue it. Text before the
/// first prefixed line is treated as a heading and skipped. When no line has
/// a prefix, each paragraph becomes a note numbered from 1.
pub fn split_notes(text: &str) -> Vec<ObservationNote> {
    let numbered = text.lines().any(|line| ordinal_prefix(line).is_some());

    if !numbered {
        return text
            .split("\n\n")
            .map(|para| para.lines().map(str::trim).filter(|l| !l.is_empty()).collect::<Vec<_>>().join(" "))
            .filter(|para| !para.is_empty())
            .enumerate()
            .map(|(index, para)| ObservationNote::new(index as u32 + 1, para))
            .collect();
    }

    let mut notes: Vec<ObservationNote> = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some((number, _)) = ordinal_prefix(line) {
            notes.push(ObservationNote::new(number, line));
        } else if let Some(current) = notes.last_mut() {
            current.text.push(' ');
            current.text.push_str(line);
        } else {
            tracing::debug!(line, "Skipping text before first numbered note");
        }
    }
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_split_numbered_notes_with_continuations() {
        let text = "Site walk 14 Oct\n\n1. Missing guardrail at level 3\n   east side\n2) Trailing cable\n\nNote 5: Good housekeeping";
        let notes = split_notes(text);

        assert_eq!(notes.len(), 3);
        assert_eq!(notes[0].id, 1);
        assert_eq!(notes[0].text, "1. Missing guardrail at level 3 east side");
        assert_eq!(notes[1].id, 2);
        assert_eq!(notes[2].id, 5);
    }

    #[test]
    fn test_split_paragraph_notes() {
        let text = "Missing guardrail\nat level 3\n\n\nTrailing cable\n\n";
        let notes = split_notes(text);
        assert_eq!(
            notes,
            vec![
                ObservationNote::new(1, "Missing guardrail at level 3"),
                ObservationNote::new(2, "Trailing cable"),
            ]
        );
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(mime_type_for(Path::new("a.JPG")), Some("image/jpeg"));
        assert_eq!(mime_type_for(Path::new("b.heic")), Some("image/heic"));
        assert_eq!(mime_type_for(Path::new("notes.txt")), None);
        assert_eq!(mime_type_for(Path::new("noext")), None);
    }

    #[test]
    fn test_load_photos_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.png"), [2u8]).unwrap();
        std::fs::write(dir.path().join("a.jpg"), [1u8]).unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub.jpg")).unwrap();

        let photos = load_photos(dir.path()).unwrap();
        assert_eq!(photos.len(), 2);
        assert_eq!(photos[0].id, 1);
        assert_eq!(photos[0].filename, "a.jpg");
        assert_eq!(photos[0].mime_type, "image/jpeg");
        assert_eq!(photos[1].filename, "b.png");
        assert_eq!(photos[1].content, vec![2u8]);
    }

    #[test]
    fn test_load_photos_missing_dir() {
        let dir = TempDir::new().unwrap();
        let result = load_photos(&dir.path().join("absent"));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
