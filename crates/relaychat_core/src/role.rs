//! Role types for transcript entries.

use serde::{Deserialize, Serialize};

/// Who produced a transcript entry.
///
/// `Error` entries are produced locally by the client whenever a send fails,
/// so the failure stays visible next to the user's own message.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Error,
}
