//! Run options for one synchronization.
//!
//! # Invariants
//! - Branch names are trimmed, non-empty and distinct after `validate`.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub const DEFAULT_PRIMARY_BRANCH: &str = "RootsMagic";
pub const DEFAULT_CATCH_ALL_BRANCH: &str = "Lost & Found";

/// When legacy repair passes run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LegacyRepair {
    /// Bind unidentified nodes only when the primary branch looks largely
    /// unbound; always normalize outdated labels.
    #[default]
    Auto,
    Always,
    Never,
}

impl LegacyRepair {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Always => "always",
            Self::Never => "never",
        }
    }
}

impl FromStr for LegacyRepair {
    type Err = OptionsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            other => Err(OptionsError::UnknownLegacyRepair(other.to_string())),
        }
    }
}

impl Display for LegacyRepair {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invalid option values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionsError {
    BlankBranchName(&'static str),
    SameBranchNames(String),
    UnknownLegacyRepair(String),
}

impl Display for OptionsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankBranchName(which) => write!(f, "{which} branch name must not be blank"),
            Self::SameBranchNames(name) => write!(
                f,
                "primary and catch-all branches must differ, both are `{name}`"
            ),
            Self::UnknownLegacyRepair(value) => write!(
                f,
                "unsupported legacy repair mode `{value}`; expected auto|always|never"
            ),
        }
    }
}

impl Error for OptionsError {}

/// Branch names and repair policy for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Root-level container mirroring the genealogy source.
    pub primary_branch: String,
    /// Root-level container holding people no longer in the source.
    pub catch_all_branch: String,
    pub legacy_repair: LegacyRepair,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            primary_branch: DEFAULT_PRIMARY_BRANCH.to_string(),
            catch_all_branch: DEFAULT_CATCH_ALL_BRANCH.to_string(),
            legacy_repair: LegacyRepair::Auto,
        }
    }
}

impl SyncOptions {
    /// Returns a copy with trimmed branch names, rejecting blank or equal ones.
    pub fn validate(&self) -> Result<Self, OptionsError> {
        let primary_branch = self.primary_branch.trim();
        if primary_branch.is_empty() {
            return Err(OptionsError::BlankBranchName("primary"));
        }
        let catch_all_branch = self.catch_all_branch.trim();
        if catch_all_branch.is_empty() {
            return Err(OptionsError::BlankBranchName("catch-all"));
        }
        if primary_branch == catch_all_branch {
            return Err(OptionsError::SameBranchNames(primary_branch.to_string()));
        }
        Ok(Self {
            primary_branch: primary_branch.to_string(),
            catch_all_branch: catch_all_branch.to_string(),
            legacy_repair: self.legacy_repair,
        })
    }
}
