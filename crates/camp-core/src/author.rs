//! Commit author metadata.
//!
//! Every clinical write is attributed to the staff member who made it. The author is rendered
//! into commit trailers (`Author-Name`, `Author-Role`) and used for the Git signature.

use crate::{CoreError, CoreResult};
use camp_types::{EmailAddress, NonEmptyText};

/// Represents the author of a clinical record commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Author {
    /// The full name of the author.
    pub name: NonEmptyText,

    /// The author's role names in the clinic, e.g. "doctor" or "doctor, admin".
    pub role: NonEmptyText,

    /// The email address of the author.
    pub email: EmailAddress,
}

impl Author {
    /// Validate that this author can be rendered into single-line commit trailers.
    ///
    /// This validation runs before any commit is created.
    pub fn validate_commit_author(&self) -> CoreResult<()> {
        if self.name.contains(['\n', '\r']) {
            return Err(CoreError::InvalidAuthorName);
        }
        if self.role.contains(['\n', '\r']) {
            return Err(CoreError::InvalidAuthorRole);
        }
        Ok(())
    }
}
