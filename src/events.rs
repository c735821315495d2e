//! Event definitions for the dashboard event loop.
//!
//! Everything that can wake the loop up (terminal input, log polls and
//! termination signals) is funnelled through [`Event`].

use crossterm::event::{KeyEvent, MouseEvent};

use crate::logview::LogContent;

/// Represents an event in the dashboard's main loop.
#[derive(Debug, Clone)]
pub enum Event {
    /// A log subscription re-read its file.
    LogSnapshot { subscription: u64, content: LogContent },
    /// A keyboard event received from the user.
    Key(KeyEvent),
    /// A mouse event received from the user.
    Mouse(MouseEvent),
    /// The terminal window was resized.
    Resize { width: u16, height: u16 },
    /// SIGINT/SIGTERM (or Ctrl-C) reached webrack itself.
    Shutdown,
}
