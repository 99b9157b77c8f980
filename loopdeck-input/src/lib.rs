//! Keyboard input handling for LoopDeck

mod commands;
mod modal;

pub use commands::Command;
pub use modal::{InputHandler, Mode};
