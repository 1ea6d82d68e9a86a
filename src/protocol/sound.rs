//! Buzzer frames. Write-only.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{duration_units, Encoded};

const CMD_STOP: u8 = 0x01;
const CMD_PRESET: u8 = 0x02;
const CMD_PLAY: u8 = 0x03;
const MAX_VOLUME: u8 = 0xFF;

/// Highest preset sound effect id.
pub const MAX_PRESET_SOUND_ID: u8 = 10;
/// Notes carried by one play frame.
pub const NOTES_PER_FRAME: usize = 59;

/// MIDI-style note number, `C0` = 0 up to `G10` = 127, plus [`Note::NO_SOUND`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Note(u8);

impl Note {
    pub const C4: Note = Note(48);
    pub const D4: Note = Note(50);
    pub const E4: Note = Note(52);
    pub const F4: Note = Note(53);
    pub const G4: Note = Note(55);
    pub const A4: Note = Note(57);
    pub const B4: Note = Note(59);
    pub const C5: Note = Note(60);
    pub const D5: Note = Note(62);
    pub const E5: Note = Note(64);
    pub const F5: Note = Note(65);
    pub const G5: Note = Note(67);
    pub const A5: Note = Note(69);
    pub const B5: Note = Note(71);
    pub const C6: Note = Note(72);
    /// A rest.
    pub const NO_SOUND: Note = Note(128);

    /// Validate a raw note number; anything above 128 is rejected.
    pub fn new(value: u8) -> Option<Note> {
        (value <= Self::NO_SOUND.0).then_some(Note(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Note {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Note::new(value).ok_or_else(|| format!("note {value} out of range 0-128"))
    }
}

impl From<Note> for u8 {
    fn from(note: Note) -> u8 {
        note.0
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [&str; 12] = [
            "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
        ];
        if *self == Self::NO_SOUND {
            return f.write_str("rest");
        }
        write!(f, "{}{}", NAMES[(self.0 % 12) as usize], self.0 / 12)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundOperation {
    /// 10-2550 ms.
    pub duration_ms: u32,
    pub note: Note,
}

impl SoundOperation {
    pub fn new(duration_ms: u32, note: Note) -> Self {
        Self { duration_ms, note }
    }
}

/// What a play frame actually carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoundScenario {
    pub operations: Vec<SoundOperation>,
    pub repeat_count: u8,
    /// 0 when the melody repeats forever.
    pub total_duration_ms: u32,
}

pub struct SoundSpec;

impl SoundSpec {
    /// Returns the frame and the preset id actually sent.
    pub fn encode_preset(sound_id: u8) -> Encoded<u8> {
        let sound_id = sound_id.min(MAX_PRESET_SOUND_ID);
        Encoded::new(vec![CMD_PRESET, sound_id, MAX_VOLUME], sound_id)
    }

    pub fn encode_play(operations: &[SoundOperation], repeat_count: u8) -> Encoded<SoundScenario> {
        let operations = &operations[..operations.len().min(NOTES_PER_FRAME)];
        let mut frame = Vec::with_capacity(3 + 3 * operations.len());
        frame.extend_from_slice(&[CMD_PLAY, repeat_count, operations.len() as u8]);

        let mut total_units = 0u32;
        let mut echoed = Vec::with_capacity(operations.len());
        for operation in operations {
            let units = duration_units(operation.duration_ms, 1);
            total_units += u32::from(units);
            frame.extend_from_slice(&[units, operation.note.value(), MAX_VOLUME]);
            echoed.push(SoundOperation {
                duration_ms: u32::from(units) * 10,
                note: operation.note,
            });
        }

        Encoded::new(
            frame,
            SoundScenario {
                operations: echoed,
                repeat_count,
                total_duration_ms: total_units * 10 * u32::from(repeat_count),
            },
        )
    }

    pub fn encode_stop() -> Vec<u8> {
        vec![CMD_STOP]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_sound() {
        let encoded = SoundSpec::encode_preset(4);
        assert_eq!(encoded.frame, vec![0x02, 0x04, 0xFF]);
        assert_eq!(encoded.echo, 4);
        assert_eq!(SoundSpec::encode_preset(200).echo, MAX_PRESET_SOUND_ID);
    }

    #[test]
    fn play_sound() {
        let ops = [
            SoundOperation::new(300, Note::C5),
            SoundOperation::new(300, Note::D5),
            SoundOperation::new(300, Note::E5),
        ];
        let encoded = SoundSpec::encode_play(&ops, 2);
        assert_eq!(
            encoded.frame,
            vec![0x03, 0x02, 0x03, 0x1E, 0x3C, 0xFF, 0x1E, 0x3E, 0xFF, 0x1E, 0x40, 0xFF]
        );
        assert_eq!(encoded.echo.operations, ops.to_vec());
        assert_eq!(encoded.echo.repeat_count, 2);
        assert_eq!(encoded.echo.total_duration_ms, 1800);
    }

    #[test]
    fn play_sound_truncates_to_frame_capacity() {
        let ops = vec![SoundOperation::new(100, Note::A4); 80];
        let encoded = SoundSpec::encode_play(&ops, 1);
        assert_eq!(encoded.frame[2] as usize, NOTES_PER_FRAME);
        assert_eq!(encoded.frame.len(), 3 + 3 * NOTES_PER_FRAME);
        assert_eq!(encoded.echo.operations.len(), NOTES_PER_FRAME);
        assert_eq!(encoded.echo.total_duration_ms, 100 * 59);
    }

    #[test]
    fn note_range_is_validated() {
        assert_eq!(Note::new(128), Some(Note::NO_SOUND));
        assert_eq!(Note::new(129), None);
        assert_eq!(Note::C5.to_string(), "C5");
        assert_eq!(Note::new(61).unwrap().to_string(), "C#5");
    }

    #[test]
    fn stop_sound() {
        assert_eq!(SoundSpec::encode_stop(), vec![0x01]);
    }
}
