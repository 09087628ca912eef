//! Core data model: entries, conversation turns and owner identity.

pub mod conversation;
pub mod entry;

pub use conversation::{latest_user_text, recent_window, ConversationTurn, OwnerId, Role};
pub use entry::{display_amount, Component, Entry, EntryDraft, MealCategory, Nutrients};
