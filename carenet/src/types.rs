//! Common type definitions and permission system types.
//!
//! ID aliases keep signatures readable without introducing newtype
//! ceremony. The permission types ([`Resource`], [`Operation`],
//! [`Permission`]) drive the role-based access checks in the auth layer:
//! operations come in `*All` (unrestricted) and `*Own` (restricted to the
//! caller's own entities) flavors, and handlers declare the permission they
//! need through the `RequiresPermission` extractor.

use serde::Deserialize;
use std::fmt;
use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type AgencyId = Uuid;
pub type PatientId = Uuid;
pub type JobId = Uuid;
pub type PaymentId = Uuid;
pub type EscrowId = Uuid;
pub type DisputeId = Uuid;
pub type FeedbackId = Uuid;
pub type CareLogId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

// Common types for path parameters
#[derive(Debug, Clone, Deserialize)]
pub enum CurrentKeyword {
    #[serde(rename = "current")]
    Current,
}

/// Lets routes like /users/current and /users/{user_id} hit the same handler.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UserIdOrCurrent {
    Current(CurrentKeyword),
    Id(UserId),
}

// Operations that can be performed on resources.
// *-All means unrestricted access, *-Own means restricted to own resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateAll,
    CreateOwn,
    ReadAll,
    ReadOwn,
    UpdateAll,
    UpdateOwn,
    DeleteAll,
    DeleteOwn,
}

// Resources that can be operated on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Users,
    Agencies,
    Patients,
    Jobs,
    Payments,
    Escrows,
    Disputes,
    Feedback,
    CareLogs,
    Analytics,
}

// Permission types for authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permission {
    /// Simple permission: (Resource, Operation)
    Allow(Resource, Operation),
    /// Logical combinator
    Any(Vec<Permission>),
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateAll | Operation::CreateOwn => write!(f, "Create"),
            Operation::ReadAll | Operation::ReadOwn => write!(f, "Read"),
            Operation::UpdateAll | Operation::UpdateOwn => write!(f, "Update"),
            Operation::DeleteAll | Operation::DeleteOwn => write!(f, "Delete"),
        }
    }
}
