use super::store::Slot;

#[derive(Debug)]
pub enum EngineError {
    NotFound(String),
    /// Cancelled reservations are terminal; they cannot be rewritten or cancelled again.
    AlreadyCancelled(String),
    /// Slot-claim mode only: another active reservation already holds the slot.
    SlotTaken {
        slot: Slot,
        holder_id: String,
    },
    /// The id belongs to the synthetic standing allocation and is never stored.
    Reserved(String),
    LimitExceeded(&'static str),
    JournalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyCancelled(id) => write!(f, "reservation {id} is already cancelled"),
            EngineError::SlotTaken { slot, holder_id } => {
                write!(f, "{slot} is already held by reservation {holder_id}")
            }
            EngineError::Reserved(id) => write!(f, "id {id} is reserved for the standing allocation"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::JournalError(e) => write!(f, "journal error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
