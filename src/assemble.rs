use std::collections::HashSet;

use crate::extract::ExtractedUnit;
use crate::formats::{Chapter, ContentEntry, ImageAsset};
use crate::ingest::IngestError;

/// Numbers units 1..=N in reading order and pairs each chapter with the ids of
/// the images it references.
///
/// Numbering is positional: a unit that yielded no paragraphs still occupies
/// its number, so chapter numbers always mirror the spine.
pub fn assemble_chapters(
    units: Vec<ExtractedUnit>,
    images: &[ImageAsset],
) -> Result<Vec<Chapter>, IngestError> {
    if units.is_empty() {
        return Err(IngestError::EmptyPackage);
    }

    let known = images.iter().map(|i| i.id.as_str()).collect::<HashSet<_>>();
    let mut chapters = Vec::with_capacity(units.len());
    for (number, unit) in (1u32..).zip(units) {
        let content = unit
            .entries
            .into_iter()
            .filter(|entry| entry.image_id().is_none_or(|id| known.contains(id)))
            .collect::<Vec<_>>();
        let images = referenced_images(&content);
        let title = unit.heading.unwrap_or_else(|| format!("Chapter {number}"));
        chapters.push(Chapter {
            number,
            title,
            content,
            images,
        });
    }
    Ok(chapters)
}

fn referenced_images(content: &[ContentEntry]) -> Vec<String> {
    let mut seen = HashSet::new();
    content
        .iter()
        .filter_map(ContentEntry::image_id)
        .filter(|id| seen.insert(*id))
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(id: &str) -> ImageAsset {
        ImageAsset {
            id: id.to_owned(),
            original_path: format!("OEBPS/{id}.png"),
            content_type: "image/png".to_owned(),
            size: 0,
            data: String::new(),
        }
    }

    fn para(text: &str) -> ContentEntry {
        ContentEntry::Paragraph(text.to_owned())
    }

    fn img(id: &str) -> ContentEntry {
        ContentEntry::Image {
            id: id.to_owned(),
            alt: String::new(),
        }
    }

    #[test]
    fn no_units_is_an_empty_package() {
        let err = assemble_chapters(Vec::new(), &[]).unwrap_err();
        assert!(matches!(err, IngestError::EmptyPackage));
    }

    #[test]
    fn numbering_is_positional_and_titles_fall_back() {
        let units = vec![
            ExtractedUnit {
                heading: Some("Prologue".to_owned()),
                entries: vec![para("a")],
            },
            ExtractedUnit::default(),
            ExtractedUnit {
                heading: None,
                entries: vec![para("c")],
            },
        ];
        let chapters = assemble_chapters(units, &[]).unwrap();
        let numbers = chapters.iter().map(|c| c.number).collect::<Vec<_>>();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(chapters[0].title, "Prologue");
        assert_eq!(chapters[1].title, "Chapter 2");
        assert!(chapters[1].content.is_empty());
        assert_eq!(chapters[2].title, "Chapter 3");
    }

    #[test]
    fn image_ids_are_deduplicated_in_first_occurrence_order() {
        let units = vec![ExtractedUnit {
            heading: None,
            entries: vec![img("b"), para("x"), img("a"), img("b"), img("ghost")],
        }];
        let chapters = assemble_chapters(units, &[asset("a"), asset("b")]).unwrap();
        assert_eq!(chapters[0].images, vec!["b", "a"]);
        assert_eq!(chapters[0].content.len(), 4);
        assert!(chapters[0].content.iter().all(|e| e.image_id() != Some("ghost")));
    }
}
