//! Keys as the state machine sees them, and a bounded text input.

/// A key press, decoupled from the terminal backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Esc,
    Tab,
    BackTab,
    Backspace,
    Delete,
    Up,
    Down,
    Left,
    Right,
    /// Ctrl+C, honored in every state.
    Interrupt,
}

/// Single-line text buffer with a character limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextInput {
    value: String,
    max_chars: usize,
}

impl TextInput {
    pub fn new(max_chars: usize) -> Self {
        Self {
            value: String::new(),
            max_chars,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Append `ch`; returns false when the buffer is full.
    pub fn push(&mut self, ch: char) -> bool {
        if self.value.chars().count() >= self.max_chars {
            return false;
        }
        self.value.push(ch);
        true
    }

    pub fn pop(&mut self) -> Option<char> {
        self.value.pop()
    }

    pub fn clear(&mut self) {
        self.value.clear();
    }
}
