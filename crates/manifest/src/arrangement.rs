//! The subset of an arrangement's XML that manifest summaries are derived from.
//!
//! Everything else in the document (tones, beats, anchors, hand shapes...) is
//! ignored while deserializing.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::instrument;

/// Declares a wrapper for an XML list element such as
/// `<phrases count="2"><phrase .../><phrase .../></phrases>`.
macro_rules! xml_list {
    ($name:ident, $child:literal, $item:ty) => {
        #[derive(Debug, Clone, Default, PartialEq, Deserialize)]
        struct $name {
            #[serde(rename = $child, default)]
            items: Vec<$item>,
        }
    };
}

xml_list!(Phrases, "phrase", Phrase);
xml_list!(PhraseIterations, "phraseIteration", PhraseIteration);
xml_list!(Sections, "section", Section);
xml_list!(ChordTemplates, "chordTemplate", ChordTemplate);
xml_list!(Levels, "level", Level);
xml_list!(Notes, "note", Note);
xml_list!(Chords, "chord", Chord);

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Phrase {
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "@maxDifficulty", default)]
    pub max_difficulty: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PhraseIteration {
    #[serde(rename = "@time")]
    pub time: f64,
    #[serde(rename = "@phraseId")]
    pub phrase_id: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Section {
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "@number", default)]
    pub number: u32,
    #[serde(rename = "@startTime")]
    pub start_time: f64,
}

/// Fret per string; `-1` marks a string the chord does not play.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChordTemplate {
    #[serde(rename = "@fret0", default = "unplayed")]
    fret0: i8,
    #[serde(rename = "@fret1", default = "unplayed")]
    fret1: i8,
    #[serde(rename = "@fret2", default = "unplayed")]
    fret2: i8,
    #[serde(rename = "@fret3", default = "unplayed")]
    fret3: i8,
    #[serde(rename = "@fret4", default = "unplayed")]
    fret4: i8,
    #[serde(rename = "@fret5", default = "unplayed")]
    fret5: i8,
}

fn unplayed() -> i8 {
    -1
}

impl ChordTemplate {
    pub fn frets(&self) -> [i8; 6] {
        [self.fret0, self.fret1, self.fret2, self.fret3, self.fret4, self.fret5]
    }

    /// Bit `n` is set when string `n` is played.
    pub fn string_mask(&self) -> u32 {
        self.frets()
            .iter()
            .enumerate()
            .filter(|(_, fret)| **fret >= 0)
            .fold(0, |mask, (string, _)| mask | (1 << string))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Note {
    #[serde(rename = "@time")]
    pub time: f64,
    #[serde(rename = "@string")]
    pub string: u8,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Chord {
    #[serde(rename = "@time")]
    pub time: f64,
    #[serde(rename = "@chordId")]
    pub chord_id: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Level {
    #[serde(rename = "@difficulty")]
    pub difficulty: u32,
    #[serde(default)]
    notes: Notes,
    #[serde(default)]
    chords: Chords,
}

impl Level {
    pub fn notes(&self) -> &[Note] {
        &self.notes.items
    }

    pub fn chords(&self) -> &[Chord] {
        &self.chords.items
    }
}

/// Timing structure of one arrangement, as left behind by the engine.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Arrangement {
    #[serde(rename = "songLength", default)]
    pub song_length: f64,
    #[serde(default)]
    phrases: Phrases,
    #[serde(rename = "phraseIterations", default)]
    phrase_iterations: PhraseIterations,
    #[serde(default)]
    sections: Sections,
    #[serde(rename = "chordTemplates", default)]
    chord_templates: ChordTemplates,
    #[serde(default)]
    levels: Levels,
}

impl Arrangement {
    pub fn from_xml(xml: &str) -> std::result::Result<Self, quick_xml::DeError> {
        quick_xml::de::from_str(xml)
    }

    #[instrument(level = "debug")]
    pub fn load(path: &Path) -> Result<Self> {
        let xml = fs::read_to_string(path).or_raise(|| ErrorKind::Io(path.to_path_buf()))?;
        Self::from_xml(&xml).or_raise(|| ErrorKind::MalformedArrangement(path.to_path_buf()))
    }

    pub fn phrases(&self) -> &[Phrase] {
        &self.phrases.items
    }

    pub fn phrase_iterations(&self) -> &[PhraseIteration] {
        &self.phrase_iterations.items
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections.items
    }

    pub fn chord_templates(&self) -> &[ChordTemplate] {
        &self.chord_templates.items
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels.items
    }

    pub fn level(&self, difficulty: u32) -> Option<&Level> {
        self.levels().iter().find(|level| level.difficulty == difficulty)
    }
}
