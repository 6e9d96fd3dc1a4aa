//! `### HEADER` section splitting
//!
//! Headers are matched case-insensitively against a fixed table after the
//! parenthetical suffix is dropped. Bodies of unknown headers are discarded
//! along with any text before the first header.

use crate::memory::types::SectionType;

/// Header titles (normalized) and the section each maps to.
const HEADER_TABLE: &[(&str, SectionType)] = &[
    ("TONE", SectionType::Tone),
    ("MOOD", SectionType::Tone),
    ("TONE MOOD", SectionType::Tone),
    ("CURRENT STATE", SectionType::CurrentState),
    ("CURRENT SITUATION", SectionType::CurrentState),
    ("WORLD STATE", SectionType::WorldState),
    ("WORLD", SectionType::WorldState),
    ("SETTING", SectionType::WorldState),
    ("CHARACTER NOTES", SectionType::CharacterNotes),
    ("VOICE", SectionType::Voice),
    ("EVENTS", SectionType::Events),
    ("KEY EVENTS", SectionType::Events),
    ("KEY DIALOGUE", SectionType::KeyDialogue),
    ("DIALOGUE", SectionType::KeyDialogue),
    ("KEY QUOTES", SectionType::KeyDialogue),
    ("NSFW CONTENT", SectionType::NsfwContent),
    ("NSFW", SectionType::NsfwContent),
    ("SCENES", SectionType::Scenes),
    ("SCENE BREAKS", SectionType::SceneBreaks),
    ("CHARACTER STATES", SectionType::CharacterStates),
    ("ANCHORS", SectionType::Anchors),
    ("DEVELOPMENTS", SectionType::Developments),
    ("RELATIONSHIP SHIFTS", SectionType::RelationshipShifts),
    ("RELATIONSHIPS", SectionType::RelationshipShifts),
    ("CALLBACKS", SectionType::Callbacks),
    ("FORESHADOWING", SectionType::Callbacks),
    ("LOOSE THREADS", SectionType::LooseThreads),
    ("OPEN THREADS", SectionType::LooseThreads),
    ("THREADS", SectionType::LooseThreads),
];

/// A recognized section with its accumulated body text.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub section_type: SectionType,
    pub body: String,
}

/// Title of a `###` header line, or `None` if the line is not a header.
///
/// `####` and deeper are ordinary text.
pub fn header_title(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let rest = trimmed.strip_prefix("###")?;
    if rest.starts_with('#') {
        return None;
    }
    Some(rest.trim())
}

/// Uppercase, punctuation-light form of a header title.
pub fn normalize_title(title: &str) -> String {
    let without_suffix = match title.find('(') {
        Some(idx) => &title[..idx],
        None => title,
    };
    without_suffix
        .chars()
        .map(|c| match c {
            '_' | '-' | '&' | '/' => ' ',
            other => other,
        })
        .filter(|c| !matches!(c, '*' | ':' | '`'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Map a raw header title to its canonical section.
pub fn section_for_title(title: &str) -> Option<SectionType> {
    let normalized = normalize_title(title);
    HEADER_TABLE
        .iter()
        .find(|(name, _)| *name == normalized)
        .map(|(_, section)| *section)
}

/// Split summary text into recognized sections in order of first appearance.
///
/// A header that repeats appends to the section it first opened.
pub fn split_sections(text: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current: Option<usize> = None;
    let mut inside_header = false;

    for line in text.lines() {
        if let Some(title) = header_title(line) {
            inside_header = true;
            current = section_for_title(title).map(|section_type| {
                match sections.iter().position(|s| s.section_type == section_type) {
                    Some(idx) => idx,
                    None => {
                        sections.push(Section {
                            section_type,
                            body: String::new(),
                        });
                        sections.len() - 1
                    }
                }
            });
            continue;
        }

        if !inside_header {
            continue;
        }

        if let Some(idx) = current {
            let body = &mut sections[idx].body;
            if !body.is_empty() {
                body.push('\n');
            }
            body.push_str(line);
        }
    }

    for section in &mut sections {
        section.body = section.body.trim().to_string();
    }

    sections
}
