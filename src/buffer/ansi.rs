//! ANSI escape sequence stripping
//!
//! Console output arrives in arbitrary chunks, so an escape sequence may be
//! split across two reads. [`AnsiStripper`] keeps its parser state between
//! calls to [`AnsiStripper::strip`].

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Ground,
    /// Saw ESC
    Escape,
    /// Inside `ESC [` ... final byte
    Csi,
    /// Inside `ESC ]` ... BEL or ST
    Osc,
    /// Saw ESC inside an OSC, expecting `\`
    OscEscape,
    /// `ESC (` / `ESC )`, one designator byte to skip
    Charset,
}

/// Streaming remover of color, cursor and erase sequences.
#[derive(Debug, Default)]
pub struct AnsiStripper {
    state: State,
}

impl AnsiStripper {
    /// Create a stripper in the ground state
    pub fn new() -> Self {
        Self::default()
    }

    /// Strip escape sequences from `data`, continuing any sequence left
    /// open by the previous call.
    pub fn strip(&mut self, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len());

        for &b in data {
            self.state = match self.state {
                State::Ground => {
                    if b == 0x1b {
                        State::Escape
                    } else {
                        out.push(b);
                        State::Ground
                    }
                }
                State::Escape => match b {
                    b'[' => State::Csi,
                    b']' => State::Osc,
                    b'(' | b')' => State::Charset,
                    _ => State::Ground,
                },
                // CSI final bytes are 0x40..=0x7e
                State::Csi => {
                    if (0x40..=0x7e).contains(&b) {
                        State::Ground
                    } else {
                        State::Csi
                    }
                }
                State::Osc => match b {
                    0x07 => State::Ground,
                    0x1b => State::OscEscape,
                    _ => State::Osc,
                },
                State::OscEscape => {
                    if b == b'\\' {
                        State::Ground
                    } else {
                        State::Osc
                    }
                }
                State::Charset => State::Ground,
            };
        }

        out
    }

    /// True when a sequence is still open.
    pub fn is_pending(&self) -> bool {
        self.state != State::Ground
    }
}

/// Strip ANSI escape sequences from a complete byte slice
pub fn strip_ansi(data: &[u8]) -> Vec<u8> {
    AnsiStripper::new().strip(data)
}
