use crate::arrangement::{Arrangement, Section};
use crate::error::{ErrorKind, Result};
use exn::OptionExt;
use serde::Serialize;

/// Difficulty slots in a section's string mask, whether or not the
/// arrangement has that many levels.
pub const STRING_MASK_LEVELS: usize = 36;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PhraseIterationSummary {
    pub phrase_index: usize,
    pub max_difficulty: u32,
    pub name: String,
    pub start_time: f64,
    pub end_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PhraseSummary {
    pub iteration_count: usize,
    pub max_difficulty: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SectionSummary {
    pub name: String,
    #[serde(rename = "UIName")]
    pub ui_name: String,
    pub number: u32,
    pub start_time: f64,
    pub end_time: f64,
    pub start_phrase_iteration_index: usize,
    pub end_phrase_iteration_index: usize,
    pub is_solo: bool,
    pub string_mask: Vec<u32>,
}

/// Everything a manifest says about an arrangement's timing structure.
///
/// Always computed from scratch; nothing is carried over from the previous
/// manifest contents.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub phrase_iterations: Vec<PhraseIterationSummary>,
    pub phrases: Vec<PhraseSummary>,
    pub sections: Vec<SectionSummary>,
    pub max_phrase_difficulty: u32,
}

impl Summary {
    pub fn compute(song: &Arrangement) -> Result<Self> {
        Ok(Self {
            phrase_iterations: phrase_iterations(song)?,
            phrases: phrases(song),
            sections: sections(song),
            max_phrase_difficulty: song.phrases().iter().map(|p| p.max_difficulty).max().unwrap_or(0),
        })
    }
}

/// Each entry ends where the next begins; the last one ends with the song.
fn end_times(starts: impl Iterator<Item = f64>, song_length: f64) -> Vec<f64> {
    let starts: Vec<f64> = starts.collect();
    starts.iter().skip(1).copied().chain(starts.first().map(|_| song_length)).collect()
}

fn phrase_iterations(song: &Arrangement) -> Result<Vec<PhraseIterationSummary>> {
    let iterations = song.phrase_iterations();
    let ends = end_times(iterations.iter().map(|it| it.time), song.song_length);
    iterations
        .iter()
        .zip(ends)
        .enumerate()
        .map(|(index, (iteration, end_time))| {
            let phrase = song
                .phrases()
                .get(iteration.phrase_id)
                .ok_or_raise(|| ErrorKind::MissingPhrase { iteration: index, phrase: iteration.phrase_id })?;
            Ok(PhraseIterationSummary {
                phrase_index: iteration.phrase_id,
                max_difficulty: phrase.max_difficulty,
                name: phrase.name.clone(),
                start_time: iteration.time,
                end_time,
            })
        })
        .collect()
}

fn phrases(song: &Arrangement) -> Vec<PhraseSummary> {
    song.phrases()
        .iter()
        .enumerate()
        .map(|(index, phrase)| PhraseSummary {
            iteration_count: song.phrase_iterations().iter().filter(|it| it.phrase_id == index).count(),
            max_difficulty: phrase.max_difficulty,
            name: phrase.name.clone(),
        })
        .collect()
}

fn sections(song: &Arrangement) -> Vec<SectionSummary> {
    let iterations = song.phrase_iterations();
    let last_iteration = iterations.len().saturating_sub(1);
    let ends = end_times(song.sections().iter().map(|s| s.start_time), song.song_length);
    song.sections()
        .iter()
        .zip(ends)
        .map(|(section, end_time)| {
            // The iteration in progress when the section starts, and the last
            // one to start before it ends.
            let start = iterations.partition_point(|it| it.time <= section.start_time).saturating_sub(1);
            let end = iterations.partition_point(|it| it.time < end_time).saturating_sub(1);
            SectionSummary {
                name: section.name.clone(),
                ui_name: ui_name(section),
                number: section.number,
                start_time: section.start_time,
                end_time,
                start_phrase_iteration_index: start.min(last_iteration),
                end_phrase_iteration_index: end.min(last_iteration),
                is_solo: section.name.eq_ignore_ascii_case("solo"),
                string_mask: string_mask(song, section.start_time, end_time),
            }
        })
        .collect()
}

/// Display name shown by the game, e.g. `Fade Out [1]` for `fade-out`
/// numbered 1.
fn ui_name(section: &Section) -> String {
    let words: Vec<String> = section
        .name
        .split(['-', '_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();
    format!("{} [{}]", words.join(" "), section.number)
}

/// Per difficulty, which strings are played in `[start, end)`.
fn string_mask(song: &Arrangement, start: f64, end: f64) -> Vec<u32> {
    let within = |time: f64| time >= start && time < end;
    (0..STRING_MASK_LEVELS)
        .map(|difficulty| {
            let Some(level) = u32::try_from(difficulty).ok().and_then(|d| song.level(d)) else {
                return 0;
            };
            let notes = level
                .notes()
                .iter()
                .filter(|note| within(note.time))
                .fold(0, |mask, note| mask | (1u32 << note.string.min(31)));
            level
                .chords()
                .iter()
                .filter(|chord| within(chord.time))
                .filter_map(|chord| song.chord_templates().get(chord.chord_id))
                .fold(notes, |mask, template| mask | template.string_mask())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrangement::tests::SONG;
    use rstest::rstest;
    use std::ops::Deref;

    fn summary() -> Summary {
        Summary::compute(&Arrangement::from_xml(SONG).unwrap()).unwrap()
    }

    #[test]
    fn phrase_iterations_span_to_the_next_one() {
        let summary = summary();
        let spans: Vec<_> = summary.phrase_iterations.iter().map(|it| (it.start_time, it.end_time)).collect();
        assert_eq!(spans, [(0.0, 10.0), (10.0, 40.0), (40.0, 90.0), (90.0, 100.0)]);
        assert_eq!(summary.phrase_iterations[1].name, "riff");
        assert_eq!(summary.phrase_iterations[1].max_difficulty, 4);
    }

    #[test]
    fn phrases_count_their_iterations() {
        let counts: Vec<_> = summary().phrases.iter().map(|p| (p.name.clone(), p.iteration_count)).collect();
        assert_eq!(counts, [("COUNT".to_string(), 1), ("riff".to_string(), 2), ("END".to_string(), 1)]);
    }

    #[test]
    fn sections_cover_their_phrase_iterations() {
        let summary = summary();
        let intro = &summary.sections[0];
        assert_eq!((intro.start_time, intro.end_time), (10.0, 40.0));
        assert_eq!((intro.start_phrase_iteration_index, intro.end_phrase_iteration_index), (1, 1));
        assert!(!intro.is_solo);
        let solo = &summary.sections[1];
        assert_eq!((solo.start_time, solo.end_time), (40.0, 100.0));
        assert_eq!((solo.start_phrase_iteration_index, solo.end_phrase_iteration_index), (2, 3));
        assert!(solo.is_solo);
    }

    #[test]
    fn string_masks_combine_notes_and_chords() {
        let summary = summary();
        let intro = &summary.sections[0].string_mask;
        assert_eq!(intro.len(), STRING_MASK_LEVELS);
        assert_eq!(intro[0], 0b1);
        assert_eq!(intro[1], 0b1111);
        assert!(intro[2..].iter().all(|mask| *mask == 0));
        assert_eq!(summary.sections[1].string_mask[0], 0b100000);
    }

    #[test]
    fn max_difficulty_is_the_hardest_phrase() {
        assert_eq!(summary().max_phrase_difficulty, 4);
    }

    #[test]
    fn dangling_phrase_reference_is_an_error() {
        let xml = r#"<song><songLength>5</songLength><phrases><phrase name="a" maxDifficulty="0"/></phrases>
            <phraseIterations><phraseIteration time="0" phraseId="3"/></phraseIterations></song>"#;
        let err = Summary::compute(&Arrangement::from_xml(xml).unwrap()).unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::MissingPhrase { iteration: 0, phrase: 3 }));
    }

    #[rstest]
    #[case("intro", 1, "Intro [1]")]
    #[case("prechorus", 2, "Prechorus [2]")]
    #[case("fade-out", 1, "Fade Out [1]")]
    fn ui_names(#[case] name: &str, #[case] number: u32, #[case] expected: &str) {
        let section = Section { name: name.to_string(), number, start_time: 0.0 };
        assert_eq!(ui_name(&section), expected);
    }
}
