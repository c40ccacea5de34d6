//! Abstract status machine.
//!
//! ```text
//! pending --approve--> approved --publish--> published
//!    |                                          ^
//!    +--reject--> rejected --resubmit--> pending+
//! ```
//!
//! Both stores and the services go through [`next_status`], so a status is
//! never written without passing the same check.

use derive_more::{Display, Error};

use crate::models::AbstractStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Approve,
    Reject,
    Resubmit,
    Publish,
}

#[derive(Debug, Display, Error, PartialEq, Eq)]
#[display(fmt = "cannot {} an abstract that is {}", action, from)]
pub struct InvalidTransition {
    pub from: AbstractStatus,
    pub action: &'static str,
}

impl Transition {
    fn verb(&self) -> &'static str {
        match self {
            Transition::Approve => "approve",
            Transition::Reject => "reject",
            Transition::Resubmit => "resubmit",
            Transition::Publish => "publish",
        }
    }
}

pub fn next_status(
    from: AbstractStatus,
    transition: Transition,
) -> Result<AbstractStatus, InvalidTransition> {
    use AbstractStatus::*;
    match (from, transition) {
        (Pending, Transition::Approve) => Ok(Approved),
        (Pending, Transition::Reject) => Ok(Rejected),
        (Rejected, Transition::Resubmit) => Ok(Pending),
        (Pending | Approved, Transition::Publish) => Ok(Published),
        _ => Err(InvalidTransition {
            from,
            action: transition.verb(),
        }),
    }
}

/// Status an abstract ends up in once one of its payments settles.
///
/// A second settled payment for an already published abstract leaves it
/// published; that is not a transition.
pub fn settled_status(from: AbstractStatus) -> Result<AbstractStatus, InvalidTransition> {
    match from {
        AbstractStatus::Published => Ok(AbstractStatus::Published),
        other => next_status(other, Transition::Publish),
    }
}

/// Admin decision on a pending abstract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    Approve,
    Reject,
}

impl ReviewAction {
    pub fn parse(action: &str) -> Option<Self> {
        match action.trim().to_ascii_lowercase().as_str() {
            "approve" => Some(ReviewAction::Approve),
            "reject" => Some(ReviewAction::Reject),
            _ => None,
        }
    }

    pub fn transition(&self) -> Transition {
        match self {
            ReviewAction::Approve => Transition::Approve,
            ReviewAction::Reject => Transition::Reject,
        }
    }
}
