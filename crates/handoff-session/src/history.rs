use handoff_core::{ChatTurn, MessageRole};
use serde::{Deserialize, Serialize};

/// Default number of turns rendered into a prompt.
pub const DEFAULT_PROMPT_TURNS: usize = 10;

/// Append-only conversation log for one session.
///
/// Turns are never edited or removed. [`recent`](Self::recent) gives the
/// bounded window used for prompts and for the `history` frame sent to new
/// connections, [`all`](Self::all) the full log for archiving.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatHistoryBuffer {
    turns: Vec<ChatTurn>,
    max_turns_for_prompt: usize,
}

impl ChatHistoryBuffer {
    pub fn new(max_turns_for_prompt: usize) -> Self {
        Self {
            turns: Vec::new(),
            max_turns_for_prompt,
        }
    }

    /// Rebuilds a buffer from previously archived turns.
    pub fn from_turns(turns: Vec<ChatTurn>, max_turns_for_prompt: usize) -> Self {
        Self {
            turns,
            max_turns_for_prompt,
        }
    }

    /// Appends a turn stamped with the current time and returns a copy of it.
    pub fn add_turn(&mut self, role: MessageRole, content: impl Into<String>) -> ChatTurn {
        let turn = ChatTurn::new(role, content);
        self.turns.push(turn.clone());
        turn
    }

    /// The last `n` turns in insertion order (fewer if the log is shorter).
    pub fn recent(&self, n: usize) -> &[ChatTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn all(&self) -> &[ChatTurn] {
        &self.turns
    }

    /// Renders the prompt window as `Role: content` lines.
    pub fn format_for_prompt(&self) -> String {
        self.recent(self.max_turns_for_prompt)
            .iter()
            .map(|turn| format!("{}: {}", turn.role.prompt_label(), turn.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

impl Default for ChatHistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT_TURNS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with(n: usize) -> ChatHistoryBuffer {
        let mut history = ChatHistoryBuffer::new(3);
        for i in 0..n {
            history.add_turn(MessageRole::User, format!("q{i}"));
        }
        history
    }

    #[test]
    fn test_recent_returns_tail_in_order() {
        let history = buffer_with(5);
        let recent: Vec<_> = history.recent(2).iter().map(|t| t.content.as_str()).collect();
        assert_eq!(recent, vec!["q3", "q4"]);
    }

    #[test]
    fn test_recent_shorter_history() {
        let history = buffer_with(2);
        assert_eq!(history.recent(20).len(), 2);
        assert!(ChatHistoryBuffer::default().recent(5).is_empty());
    }

    #[test]
    fn test_all_keeps_everything() {
        let history = buffer_with(7);
        assert_eq!(history.all().len(), 7);
        assert_eq!(history.all()[0].content, "q0");
        assert_eq!(history.len(), 7);
    }

    #[test]
    fn test_timestamps_non_decreasing() {
        let history = buffer_with(10);
        for pair in history.all().windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[test]
    fn test_format_for_prompt_uses_window() {
        let mut history = ChatHistoryBuffer::new(2);
        history.add_turn(MessageRole::User, "hello");
        history.add_turn(MessageRole::Bot, "hi there");
        history.add_turn(MessageRole::HumanAgent, "Sam here");
        assert_eq!(history.format_for_prompt(), "Bot: hi there\nAgent: Sam here");
    }

    #[test]
    fn test_add_turn_returns_stored_copy() {
        let mut history = ChatHistoryBuffer::default();
        let turn = history.add_turn(MessageRole::System, "handoff");
        assert_eq!(history.all()[0], turn);
    }
}
