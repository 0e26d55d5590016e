//! Persistence layer — libSQL-backed storage for leads and their messages.

pub mod lead;
pub mod sqlite;
pub mod traits;

pub use lead::{
    EditableField, Lead, LeadMessage, LeadStats, LeadStatus, MESSAGE_DELIMITER, NewLead,
    RawMessage,
};
pub use sqlite::SqliteLeadStore;
pub use traits::LeadStore;
