//! Modal state machine for keyboard input handling
//!
//! Plain lowercase keys are the pads: any key in the catalog triggers its
//! sound. Track and transport controls sit on uppercase letters, digits, and
//! punctuation so the pad rows stay free.

use crate::commands::Command;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::HashSet;

/// Input modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Normal,
    Help,
}

impl Mode {
    /// Get display name for the mode
    pub fn display_name(&self) -> &'static str {
        match self {
            Mode::Normal => "NORMAL",
            Mode::Help => "HELP",
        }
    }
}

/// Handles keyboard input and converts to commands
pub struct InputHandler {
    mode: Mode,
    /// Pad keys from the sound catalog
    sound_keys: HashSet<char>,
}

impl InputHandler {
    pub fn new(sound_keys: impl IntoIterator<Item = char>) -> Self {
        Self {
            mode: Mode::Normal,
            sound_keys: sound_keys.into_iter().collect(),
        }
    }

    /// Get current mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Handle a key event and return a command if applicable
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Command> {
        match self.mode {
            Mode::Normal => self.handle_normal_mode(key),
            Mode::Help => self.handle_help_mode(key),
        }
    }

    fn handle_normal_mode(&mut self, key: KeyEvent) -> Option<Command> {
        // Quit
        if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Some(Command::Quit);
        }

        match key.code {
            // Pads first: the catalog owns the lowercase rows.
            KeyCode::Char(c) if self.sound_keys.contains(&c) => Some(Command::TriggerSound(c)),

            // Track selection
            KeyCode::Char(c @ '1'..='9') => {
                Some(Command::SelectTrack(c as usize - '1' as usize))
            }
            KeyCode::Tab => Some(Command::CycleFocus),

            // Recording and looping
            KeyCode::Enter => Some(Command::ToggleRecord),
            KeyCode::Char('L') => Some(Command::ToggleLoop),
            KeyCode::Char(' ') => Some(Command::ToggleAllLoops),

            // Track management
            KeyCode::Char('N') => Some(Command::AddTrack),
            KeyCode::Char('D') => Some(Command::RemoveTrack),

            // Mixing
            KeyCode::Char('M') => Some(Command::ToggleMute),
            KeyCode::Char('S') => Some(Command::ToggleSolo),
            KeyCode::Char('[') => Some(Command::AdjustVolume(-2.0)),
            KeyCode::Char(']') => Some(Command::AdjustVolume(2.0)),
            KeyCode::Char('{') => Some(Command::AdjustPan(-0.1)),
            KeyCode::Char('}') => Some(Command::AdjustPan(0.1)),

            // Tempo
            KeyCode::Char('-') => Some(Command::AdjustBpm(-2.0)),
            KeyCode::Char('=') => Some(Command::AdjustBpm(2.0)),
            KeyCode::Char('Q') => Some(Command::ToggleQuantize),

            // Export
            KeyCode::Char('E') => Some(Command::ExportMix),

            KeyCode::Char('?') => {
                self.mode = Mode::Help;
                Some(Command::ToggleHelp)
            }
            KeyCode::Esc => Some(Command::Cancel),

            _ => None,
        }
    }

    fn handle_help_mode(&mut self, key: KeyEvent) -> Option<Command> {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('?') => {
                self.mode = Mode::Normal;
                Some(Command::ToggleHelp)
            }
            _ => None,
        }
    }
}

impl Default for InputHandler {
    fn default() -> Self {
        Self::new([])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    fn handler() -> InputHandler {
        InputHandler::new(['a', 's', 'd'])
    }

    #[test]
    fn test_pad_key_triggers_sound() {
        let mut h = handler();
        assert_eq!(h.handle_key(press('a')), Some(Command::TriggerSound('a')));
        assert_eq!(h.handle_key(press('s')), Some(Command::TriggerSound('s')));
    }

    #[test]
    fn test_non_pad_lowercase_is_ignored() {
        let mut h = handler();
        assert_eq!(h.handle_key(press('z')), None);
    }

    #[test]
    fn test_digits_select_tracks() {
        let mut h = handler();
        assert_eq!(h.handle_key(press('1')), Some(Command::SelectTrack(0)));
        assert_eq!(h.handle_key(press('9')), Some(Command::SelectTrack(8)));
    }

    #[test]
    fn test_transport_controls() {
        let mut h = handler();
        assert_eq!(h.handle_key(press(' ')), Some(Command::ToggleAllLoops));
        assert_eq!(
            h.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE)),
            Some(Command::ToggleRecord)
        );
        assert_eq!(h.handle_key(press('L')), Some(Command::ToggleLoop));
        assert_eq!(h.handle_key(press('M')), Some(Command::ToggleMute));
        assert_eq!(h.handle_key(press('S')), Some(Command::ToggleSolo));
        assert_eq!(h.handle_key(press('E')), Some(Command::ExportMix));
    }

    #[test]
    fn test_ctrl_q_quits() {
        let mut h = handler();
        let quit = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::CONTROL);
        assert_eq!(h.handle_key(quit), Some(Command::Quit));
    }

    #[test]
    fn test_help_mode_round_trip() {
        let mut h = handler();
        assert_eq!(h.handle_key(press('?')), Some(Command::ToggleHelp));
        assert_eq!(h.mode(), Mode::Help);
        // Pads do nothing inside help.
        assert_eq!(h.handle_key(press('a')), None);
        assert_eq!(
            h.handle_key(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE)),
            Some(Command::ToggleHelp)
        );
        assert_eq!(h.mode(), Mode::Normal);
    }
}
