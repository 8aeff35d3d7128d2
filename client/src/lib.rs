//! Client-side reconciliation for the semester chat: optimistic local
//! entries matched to server-confirmed messages by `tempId`, an unseen
//! counter for live messages arriving off-screen, and typing-indicator
//! expiry. Transport-agnostic; the embedding app moves the produced
//! events over the live connection or the HTTP fallback.

pub mod typing;
pub mod view_model;

pub use typing::TypingPeers;
pub use view_model::{ChatViewModel, DeliveryStatus, Entry, PendingSend};
