//! Error types for lot_tracker

use std::fmt;

/// Unified error type for lot tracking operations
#[derive(Debug)]
pub enum LotError {
    /// Database operation failed
    Database(rusqlite::Error),
    /// Quantity outside the valid domain (must be at least 1)
    InvalidQuantity(u32),
    /// Distinct card-type count outside the valid domain (must be at least 1)
    InvalidTypeCount(u32),
    /// Card type is not in the product catalog
    UnknownCardType(String),
    /// Country is not one of the managed subsidiaries
    UnknownCountry(String),
    /// A lot with this name already exists
    DuplicateLotName(String),
    /// No lot with this id
    LotNotFound(i64),
    /// No record with this id in the named table
    RecordNotFound(&'static str, i64),
    /// No courier registered for the delivery agency
    NoCourierForAgency(String),
}

impl fmt::Display for LotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LotError::Database(e) => write!(f, "Database error: {}", e),
            LotError::InvalidQuantity(q) => {
                write!(f, "Invalid quantity: {} (must be at least 1)", q)
            }
            LotError::InvalidTypeCount(n) => {
                write!(f, "Invalid card-type count: {} (must be at least 1)", n)
            }
            LotError::UnknownCardType(t) => write!(f, "Unknown card type: {}", t),
            LotError::UnknownCountry(c) => write!(f, "Unknown country: {}", c),
            LotError::DuplicateLotName(name) => {
                write!(f, "A lot named '{}' already exists", name)
            }
            LotError::LotNotFound(id) => write!(f, "No lot with id {}", id),
            LotError::RecordNotFound(table, id) => {
                write!(f, "No {} record with id {}", table, id)
            }
            LotError::NoCourierForAgency(agency) => {
                write!(f, "No courier registered for agency: {}", agency)
            }
        }
    }
}

impl std::error::Error for LotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LotError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for LotError {
    fn from(err: rusqlite::Error) -> Self {
        LotError::Database(err)
    }
}

/// Result alias for lot tracking operations
pub type Result<T> = std::result::Result<T, LotError>;
