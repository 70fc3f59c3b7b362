// SPDX-License-Identifier: MIT OR Apache-2.0
//! Chat transcript shown to the user.

use std::collections::VecDeque;
use std::fmt;
use std::time::SystemTime;

/// Oldest entries are dropped past this many
pub const MAX_TRANSCRIPT_ENTRIES: usize = 500;

/// Who said it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Typed by the user
    User,
    /// Reply from the studio
    Assistant,
    /// Status and errors
    System,
}

impl Role {
    fn prefix(&self) -> &'static str {
        match self {
            Self::User => ">",
            Self::Assistant => "atelier:",
            Self::System => "!",
        }
    }
}

/// One transcript line
#[derive(Debug, Clone)]
pub struct ChatEntry {
    /// Sequence number, increasing
    pub id: u64,
    /// Author
    pub role: Role,
    /// Text
    pub text: String,
    /// Wall clock time, HH:MM:SS UTC
    pub timestamp: String,
}

impl fmt::Display for ChatEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.timestamp, self.role.prefix(), self.text)
    }
}

/// Bounded chat history
#[derive(Debug)]
pub struct Transcript {
    entries: VecDeque<ChatEntry>,
    max_entries: usize,
    next_id: u64,
}

impl Transcript {
    /// Create an empty transcript
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries: MAX_TRANSCRIPT_ENTRIES,
            next_id: 0,
        }
    }

    /// Append a line and return it
    pub fn push(&mut self, role: Role, text: impl Into<String>) -> &ChatEntry {
        self.entries.push_back(ChatEntry {
            id: self.next_id,
            role,
            text: text.into(),
            timestamp: format_system_time(&SystemTime::now()),
        });
        self.next_id += 1;
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
        let last = self.entries.len() - 1;
        &self.entries[last]
    }

    /// Record a user line
    pub fn user(&mut self, text: impl Into<String>) -> &ChatEntry {
        self.push(Role::User, text)
    }

    /// Record a studio reply
    pub fn assistant(&mut self, text: impl Into<String>) -> &ChatEntry {
        self.push(Role::Assistant, text)
    }

    /// Record a status or error line
    pub fn system(&mut self, text: impl Into<String>) -> &ChatEntry {
        self.push(Role::System, text)
    }

    /// Entries pushed at or after sequence number `id`
    pub fn since(&self, id: u64) -> impl Iterator<Item = &ChatEntry> {
        self.entries.iter().filter(move |e| e.id >= id)
    }

    /// Sequence number the next entry will get
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Most recent entry
    pub fn last(&self) -> Option<&ChatEntry> {
        self.entries.back()
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a SystemTime as HH:MM:SS
fn format_system_time(time: &SystemTime) -> String {
    let secs = time
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{:02}:{:02}:{:02}", (secs / 3600) % 24, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_push_and_bound() {
        let mut transcript = Transcript::new();
        for i in 0..MAX_TRANSCRIPT_ENTRIES + 5 {
            transcript.user(format!("line {i}"));
        }
        assert_eq!(transcript.since(0).count(), MAX_TRANSCRIPT_ENTRIES);
        assert_eq!(transcript.since(0).next().unwrap().text, "line 5");

        let mark = transcript.next_id();
        transcript.assistant("reply");
        let fresh: Vec<_> = transcript.since(mark).map(|e| e.text.as_str()).collect();
        assert_eq!(fresh, vec!["reply"]);
    }

    #[test]
    fn test_display() {
        let mut transcript = Transcript::new();
        transcript.system("Generation failed: timeout");
        let line = transcript.last().unwrap().to_string();
        assert!(line.ends_with("! Generation failed: timeout"));
    }

    #[test]
    fn test_format_system_time() {
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(3600 * 25 + 61);
        assert_eq!(format_system_time(&t), "01:01:01");
    }
}
