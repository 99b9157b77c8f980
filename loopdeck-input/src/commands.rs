//! Commands produced by the input handler

/// High-level commands the UI layer dispatches to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Play a pad sound (and record it when the selected track is armed)
    TriggerSound(char),

    /// Select track by index (0-based)
    SelectTrack(usize),
    /// Move selection to the next track
    CycleFocus,

    /// Arm or stop recording on the selected track
    ToggleRecord,
    /// Start or stop the selected track's loop
    ToggleLoop,
    /// Stop all loops, or start every recorded track
    ToggleAllLoops,

    AddTrack,
    RemoveTrack,

    ToggleMute,
    ToggleSolo,
    /// Volume delta in dB for the selected track
    AdjustVolume(f32),
    /// Pan delta for the selected track
    AdjustPan(f32),

    AdjustBpm(f32),
    ToggleQuantize,

    ExportMix,

    ToggleHelp,
    Cancel,
    Quit,
}
