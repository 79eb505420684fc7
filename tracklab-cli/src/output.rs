//! Terminal styling
//!
//! Colours come from the presentation descriptors of `tracklab-core`; no
//! command keeps its own status-to-colour table.

use colored::{ColoredString, Colorize};
use tracklab_core::presentation::{StatusDescriptor, Tone};

/// Apply a tone's colour to text
pub fn paint(text: &str, tone: Tone) -> ColoredString {
    match tone {
        Tone::Muted => text.dimmed(),
        Tone::Active => text.cyan(),
        Tone::Success => text.green(),
        Tone::Warning => text.yellow(),
        Tone::Danger => text.red(),
    }
}

/// `✓ completed`, coloured
pub fn status(descriptor: StatusDescriptor) -> ColoredString {
    paint(
        &format!("{} {}", descriptor.glyph, descriptor.label),
        descriptor.tone,
    )
}

/// Status label without glyph, coloured
pub fn label(descriptor: StatusDescriptor) -> ColoredString {
    paint(descriptor.label, descriptor.tone)
}

pub fn glyph(descriptor: StatusDescriptor) -> ColoredString {
    paint(descriptor.glyph, descriptor.tone)
}

/// Horizontal section rule
pub fn rule() -> ColoredString {
    "─".repeat(80).dimmed()
}
