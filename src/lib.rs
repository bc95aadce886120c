pub mod chat;
pub mod config;
pub mod tickets;

pub use chat::{ChatError, ChatPort, UserRef};
pub use config::TicketConfig;
pub use tickets::sweeper::TicketSweeper;
pub use tickets::transcript::TranscriptDocument;
pub use tickets::types::{
    ClaimEvent, ClaimOutcome, CloseReason, Lifecycle, Ticket, TicketCategory, TicketError,
    TicketId,
};
pub use tickets::TicketService;
