//! Stage identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of one step in the generation sequence.
///
/// The declaration order is the advancement order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKey {
    /// Protagonist generation.
    Character,
    /// Faction generation.
    Faction,
    /// Setting generation.
    Setting,
    /// Inciting event generation.
    Event,
    /// Relic generation.
    Relic,
    /// Final story assembly from every previous selection.
    FinalStory,
}

impl StageKey {
    /// Returns the wire name of the stage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Faction => "faction",
            Self::Setting => "setting",
            Self::Event => "event",
            Self::Relic => "relic",
            Self::FinalStory => "final_story",
        }
    }
}

impl fmt::Display for StageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "character" => Ok(Self::Character),
            "faction" => Ok(Self::Faction),
            "setting" => Ok(Self::Setting),
            "event" => Ok(Self::Event),
            "relic" => Ok(Self::Relic),
            "final_story" | "final-story" | "story" => Ok(Self::FinalStory),
            other => Err(format!("unknown stage '{other}'")),
        }
    }
}

/// What a stage's job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// The job yields a list of candidates the user picks from.
    Candidates,
    /// The job yields the assembled story; nothing to pick.
    Story,
}

impl StageKind {
    /// Returns true if the stage ends with a user selection.
    #[must_use]
    pub const fn is_selectable(&self) -> bool {
        matches!(self, Self::Candidates)
    }
}
