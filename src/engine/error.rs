use chrono::NaiveDate;
use thiserror::Error;

use crate::model::{ClientId, EmployeeId, RoomId, StayId};

/// Coarse classification callers dispatch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidState,
    Validation,
    Contention,
    Storage,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("room not found: {0}")]
    UnknownRoom(RoomId),
    #[error("client not found: {0}")]
    UnknownClient(ClientId),
    #[error("stay not found: {0}")]
    StayNotFound(StayId),
    #[error("employee not found: {0}")]
    UnknownEmployee(EmployeeId),
    #[error("client {0} has no active stay")]
    NoActiveStay(ClientId),

    #[error("room {room} is occupied by stay {stay}")]
    RoomOccupied { room: RoomId, stay: StayId },
    #[error("client {client} already has active stay {stay}")]
    ClientAlreadyStaying { client: ClientId, stay: StayId },
    #[error("room number {0} already exists")]
    DuplicateRoomNumber(u32),
    #[error("passport number already registered to client {0}")]
    DuplicatePassport(ClientId),

    #[error("room {0} is not active")]
    InactiveRoom(RoomId),
    #[error("stay {0} is already completed")]
    AlreadyCompleted(StayId),
    #[error("employee {0} is fired")]
    EmployeeFired(EmployeeId),
    #[error("room {room} is in use: {reason}")]
    RoomInUse { room: RoomId, reason: &'static str },

    #[error("invalid date {date}: {reason}")]
    InvalidDate { date: NaiveDate, reason: &'static str },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),

    #[error("lock contention on {0}")]
    Contention(String),
    #[error("WAL error: {0}")]
    WalError(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::UnknownRoom(_)
            | EngineError::UnknownClient(_)
            | EngineError::StayNotFound(_)
            | EngineError::UnknownEmployee(_)
            | EngineError::NoActiveStay(_) => ErrorKind::NotFound,
            EngineError::RoomOccupied { .. }
            | EngineError::ClientAlreadyStaying { .. }
            | EngineError::DuplicateRoomNumber(_)
            | EngineError::DuplicatePassport(_) => ErrorKind::Conflict,
            EngineError::InactiveRoom(_)
            | EngineError::AlreadyCompleted(_)
            | EngineError::EmployeeFired(_)
            | EngineError::RoomInUse { .. } => ErrorKind::InvalidState,
            EngineError::InvalidDate { .. }
            | EngineError::Validation(_)
            | EngineError::LimitExceeded(_) => ErrorKind::Validation,
            EngineError::Contention(_) => ErrorKind::Contention,
            EngineError::WalError(_) => ErrorKind::Storage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(EngineError::UnknownRoom(RoomId(1)).kind(), ErrorKind::NotFound);
        assert_eq!(EngineError::NoActiveStay(ClientId(1)).kind(), ErrorKind::NotFound);
        assert_eq!(
            EngineError::RoomOccupied { room: RoomId(1), stay: StayId(2) }.kind(),
            ErrorKind::Conflict
        );
        assert_eq!(EngineError::AlreadyCompleted(StayId(1)).kind(), ErrorKind::InvalidState);
        assert_eq!(EngineError::LimitExceeded("x").kind(), ErrorKind::Validation);
        assert_eq!(EngineError::Contention("room 1".into()).kind(), ErrorKind::Contention);
    }

    #[test]
    fn display_names_the_entity() {
        let e = EngineError::RoomOccupied { room: RoomId(101), stay: StayId(9) };
        assert_eq!(e.to_string(), "room 101 is occupied by stay 9");
    }
}
