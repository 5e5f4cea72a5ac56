//! Input editor
//!
//! A cooperative, non-blocking line editor: callers feed it one [`Key`] at
//! a time (from wherever they read raw input) and it reports caret
//! position, viewport, and — on Enter — the submitted line. Not required
//! when input is redirected from a file or pipe; a host reading from a
//! non-tty source can skip this module entirely and push lines straight
//! into the dispatcher.

pub mod history;

use history::History;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    Backspace,
    Delete,
    Escape,
    Tab,
    Char(char),
}

/// A function that yields the next completion candidate for `prefix`,
/// strictly after `last` if given, wrapping around.
pub trait Completer {
    fn complete(&self, prefix: &str, last: Option<&str>) -> Option<String>;
}

impl<F: Fn(&str, Option<&str>) -> Option<String>> Completer for F {
    fn complete(&self, prefix: &str, last: Option<&str>) -> Option<String> {
        self(prefix, last)
    }
}

struct TabState {
    partial: String,
    last_candidate: Option<String>,
}

/// Caret, viewport, and history state for one interactive input line.
pub struct Editor {
    line: Vec<char>,
    caret: usize,
    viewport_offset: usize,
    viewport_width: usize,
    prompt_width: usize,
    history: History,
    tab: Option<TabState>,
}

impl Editor {
    pub fn new(viewport_width: usize, prompt_width: usize) -> Self {
        Self {
            line: Vec::new(),
            caret: 0,
            viewport_offset: 0,
            viewport_width,
            prompt_width,
            history: History::default(),
            tab: None,
        }
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history = History::with_capacity(capacity);
        self
    }

    pub fn line(&self) -> String {
        self.line.iter().collect()
    }

    pub fn caret(&self) -> usize {
        self.caret
    }

    /// The visible slice of the line and the caret's on-screen column:
    /// `caret - viewport_offset + prompt_width`.
    pub fn visible(&self) -> (String, usize) {
        let end = (self.viewport_offset + self.viewport_width).min(self.line.len());
        let start = self.viewport_offset.min(end);
        let visible: String = self.line[start..end].iter().collect();
        let column = self.caret - self.viewport_offset + self.prompt_width;
        (visible, column)
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Feed one key event. Returns the submitted line on Enter with a
    /// non-empty buffer; `None` otherwise.
    pub fn handle(&mut self, key: Key, completer: &dyn Completer) -> Option<String> {
        if !matches!(key, Key::Tab) {
            self.tab = None;
        }

        match key {
            Key::Enter => {
                if self.line.is_empty() {
                    return None;
                }
                let submitted = self.line();
                self.history.submit(submitted.clone());
                self.reset_line();
                Some(submitted)
            }
            Key::Up => {
                self.replace_line(self.history.older().map(str::to_string));
                None
            }
            Key::Down => {
                self.replace_line(self.history.newer().map(str::to_string));
                None
            }
            Key::Left => {
                self.caret = self.caret.saturating_sub(1);
                self.adjust_viewport();
                None
            }
            Key::Right => {
                self.caret = (self.caret + 1).min(self.line.len());
                self.adjust_viewport();
                None
            }
            Key::Home => {
                self.caret = 0;
                self.adjust_viewport();
                None
            }
            Key::End => {
                self.caret = self.line.len();
                self.adjust_viewport();
                None
            }
            Key::Backspace => {
                if self.caret > 0 {
                    self.line.remove(self.caret - 1);
                    self.caret -= 1;
                    self.adjust_viewport();
                }
                None
            }
            Key::Delete => {
                if self.caret < self.line.len() {
                    self.line.remove(self.caret);
                }
                None
            }
            Key::Escape => {
                self.reset_line();
                None
            }
            Key::Tab => {
                self.cycle_completion(completer);
                None
            }
            Key::Char(ch) => {
                self.line.insert(self.caret, ch);
                self.caret += 1;
                self.adjust_viewport();
                None
            }
        }
    }

    fn cycle_completion(&mut self, completer: &dyn Completer) {
        let tab = self.tab.get_or_insert_with(|| TabState { partial: self.line(), last_candidate: None });
        let partial = tab.partial.clone();
        let last = tab.last_candidate.clone();
        if let Some(candidate) = completer.complete(&partial, last.as_deref()) {
            self.line = candidate.chars().collect();
            self.caret = self.line.len();
            self.adjust_viewport();
            self.tab.as_mut().unwrap().last_candidate = Some(candidate);
        }
    }

    fn replace_line(&mut self, new_line: Option<String>) {
        self.line = new_line.unwrap_or_default().chars().collect();
        self.caret = self.line.len();
        self.adjust_viewport();
    }

    fn reset_line(&mut self) {
        self.line.clear();
        self.caret = 0;
        self.viewport_offset = 0;
        self.tab = None;
    }

    fn adjust_viewport(&mut self) {
        if self.caret < self.viewport_offset {
            self.viewport_offset = self.caret;
        } else if self.caret > self.viewport_offset + self.viewport_width {
            self.viewport_offset = self.caret - self.viewport_width;
        }
    }
}
