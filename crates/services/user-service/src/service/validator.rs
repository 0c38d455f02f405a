//! Identifier availability checks.
//!
//! The membership filter answers first. Only a "possibly present" answer
//! costs a database lookup; "definitely absent" is trusted outright.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use common::AppResult;
use domain::{Identifier, IdentifierKind};

use crate::filter::{Membership, MembershipFilter};
use crate::repository::UserRepository;

/// Availability check result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Availability {
    /// True when no user holds this identifier
    pub available: bool,
}

/// Availability checks for one identifier kind.
pub struct UniquenessValidator {
    filter: Arc<MembershipFilter>,
    repo: Arc<dyn UserRepository>,
}

impl UniquenessValidator {
    pub fn new(filter: Arc<MembershipFilter>, repo: Arc<dyn UserRepository>) -> Self {
        Self { filter, repo }
    }

    pub fn kind(&self) -> IdentifierKind {
        self.filter.kind()
    }

    pub fn filter(&self) -> &Arc<MembershipFilter> {
        &self.filter
    }

    /// Normalize raw input and check it.
    ///
    /// Malformed input fails validation rather than reporting available.
    pub async fn check_availability(&self, raw: &str) -> AppResult<Availability> {
        let identifier = Identifier::parse(self.kind(), raw)?;
        self.check(&identifier).await
    }

    /// Check an already normalized identifier.
    pub async fn check(&self, identifier: &Identifier) -> AppResult<Availability> {
        match self.filter.test(identifier).await? {
            Membership::DefinitelyAbsent => {
                debug!(kind = %identifier.kind(), "Identifier never registered");
                Ok(Availability { available: true })
            }
            Membership::PossiblyPresent => {
                let existing = self.repo.find_by_identifier(identifier).await?;
                debug!(
                    kind = %identifier.kind(),
                    taken = existing.is_some(),
                    "Filter hit confirmed against database"
                );
                Ok(Availability {
                    available: existing.is_none(),
                })
            }
        }
    }
}
