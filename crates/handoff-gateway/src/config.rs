use serde::{Deserialize, Serialize};

/// Tunables for the connection hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Frames a connection may have queued before it is evicted.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Turns sent in the `history` frame on connect.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Turns rendered into the prompt handed to the query engine.
    #[serde(default = "default_max_turns_for_prompt")]
    pub max_turns_for_prompt: usize,
    /// Reply used when the query engine fails.
    #[serde(default = "default_apology")]
    pub apology: String,
}

fn default_outbound_buffer() -> usize {
    64
}

fn default_history_window() -> usize {
    20
}

fn default_max_turns_for_prompt() -> usize {
    10
}

fn default_apology() -> String {
    "I'm sorry, I ran into a problem answering that. Please try again.".to_string()
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: default_outbound_buffer(),
            history_window: default_history_window(),
            max_turns_for_prompt: default_max_turns_for_prompt(),
            apology: default_apology(),
        }
    }
}
