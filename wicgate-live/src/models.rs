use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier as sent by the stats API: numeric for most rows, a string for a few legacy ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
  Num(i64),
  Text(String),
}

impl Id {
  /// Server id a profile carries when the player is online but not on a server.
  pub const UNASSIGNED: Id = Id::Num(0);

  /// True for the "online but not on a server" sentinel, in either wire form.
  pub fn is_unassigned(&self) -> bool {
    match self {
      Id::Num(n) => *n == 0,
      Id::Text(s) => s == "0",
    }
  }
}

impl fmt::Display for Id {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Id::Num(n) => write!(f, "{n}"),
      Id::Text(s) => f.write_str(s),
    }
  }
}

impl From<i64> for Id {
  fn from(n: i64) -> Self {
    Id::Num(n)
  }
}

impl From<&str> for Id {
  fn from(s: &str) -> Self {
    Id::Text(s.to_string())
  }
}

/// A game server currently reporting to the stats API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEntry {
  pub server_id: Id,
  pub server_name: String,
}

/// A player currently online.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineProfile {
  pub profile_id: Id,
  /// Server the player is on, or [`Id::UNASSIGNED`].
  pub server_id: Id,
  pub profile_name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rank: Option<i64>,
  /// Clan short name substituted for `C` in `tag_format`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub short_name: Option<String>,
  /// Clan tag layout, e.g. `[C]P`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tag_format: Option<String>,
}

/// Body of `GET {api_base}/online`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnlineResponse {
  #[serde(default)]
  pub servers: Vec<ServerEntry>,
  #[serde(default)]
  pub profiles: Vec<OnlineProfile>,
}
