use crate::model::{BookingStatus, SlotRange};
use crate::store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    Invalid(String),
    SlotNotOffered {
        slot: SlotRange,
        reason: Option<String>,
    },
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    SlotTaken {
        slot: SlotRange,
        holder: String,
    },
    Store(StoreError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Invalid(msg) => write!(f, "invalid booking: {msg}"),
            EngineError::SlotNotOffered { slot, reason } => match reason {
                Some(reason) => write!(f, "{slot} is not offered that day. {reason}"),
                None => write!(f, "{slot} is not offered that day"),
            },
            EngineError::InvalidTransition { from, to } => {
                write!(f, "cannot change a {from} booking to {to}")
            }
            EngineError::SlotTaken { slot, holder } => {
                write!(f, "{slot} is already held by booking {holder}")
            }
            EngineError::Store(e) => write!(f, "booking server error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Store(e)
    }
}
