use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

/// Render the most recent turns as a context section. Returns `None` when
/// nothing survives the window.
pub fn render_history(
    turns: &[ConversationTurn],
    max_turns: usize,
    user_turns_only: bool,
) -> Option<String> {
    if max_turns == 0 {
        return None;
    }

    let kept: Vec<&ConversationTurn> = turns
        .iter()
        .filter(|t| !user_turns_only || t.role == Role::User)
        .collect();
    let window = &kept[kept.len().saturating_sub(max_turns)..];

    if window.is_empty() {
        return None;
    }

    let mut section = String::from("-----Conversation History-----\n");
    for turn in window {
        let role = match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        section.push_str(&format!("{}: {}\n", role, turn.content));
    }
    Some(section)
}
