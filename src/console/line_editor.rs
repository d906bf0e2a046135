/// Unsubmitted input line, fed one keystroke at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineEditor {
    buffer: String,
}

/// What the display should do in response to an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditEcho {
    /// Echo this text.
    Text(String),
    /// Erase the last character on screen.
    Erase,
    Nothing,
}

impl EditEcho {
    pub fn as_str(&self) -> &str {
        match self {
            EditEcho::Text(text) => text,
            EditEcho::Erase => "\u{8} \u{8}",
            EditEcho::Nothing => "",
        }
    }
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Append a printable character. Control characters are ignored.
    pub fn insert(&mut self, ch: char) -> EditEcho {
        if ch.is_control() {
            return EditEcho::Nothing;
        }
        self.buffer.push(ch);
        EditEcho::Text(ch.to_string())
    }

    pub fn backspace(&mut self) -> EditEcho {
        match self.buffer.pop() {
            Some(_) => EditEcho::Erase,
            None => EditEcho::Nothing,
        }
    }

    /// Take the buffered line. Returns `None` (and clears the buffer) when
    /// it holds only whitespace.
    pub fn submit(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buffer);
        let trimmed = line.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_owned())
        }
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn typing_and_backspace() {
        let mut editor = LineEditor::new();
        for ch in "lss".chars() {
            assert_eq!(editor.insert(ch), EditEcho::Text(ch.to_string()));
        }
        assert_eq!(editor.backspace(), EditEcho::Erase);
        assert_eq!(editor.as_str(), "ls");
        assert_eq!(EditEcho::Erase.as_str(), "\u{8} \u{8}");
    }

    #[test]
    fn backspace_on_empty_line_does_nothing() {
        let mut editor = LineEditor::new();
        assert_eq!(editor.backspace(), EditEcho::Nothing);
        assert!(editor.is_empty());
    }

    #[test]
    fn control_characters_are_not_buffered() {
        let mut editor = LineEditor::new();
        assert_eq!(editor.insert('\u{1b}'), EditEcho::Nothing);
        assert!(editor.is_empty());
    }

    #[test]
    fn submit_takes_trimmed_line() {
        let mut editor = LineEditor::new();
        for ch in "  git status ".chars() {
            editor.insert(ch);
        }
        assert_eq!(editor.submit().as_deref(), Some("git status"));
        assert!(editor.is_empty());
    }

    #[test]
    fn blank_submit_is_none() {
        let mut editor = LineEditor::new();
        editor.insert(' ');
        assert_eq!(editor.submit(), None);
        assert!(editor.is_empty());
    }
}
