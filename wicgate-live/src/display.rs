//! Player presentation helpers: clan-tag formatting, colour markers and
//! grouping online players by server.

use crate::models::{OnlineProfile, ServerEntry};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

const UNKNOWN_PLAYER: &str = "Unknown";
const NEUTRAL_COLOR: &str = "#f3f6f8";

/// Clan tag and bare player name, for separately styled rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedPlayer {
  pub clan_tag: String,
  pub player_name: String,
}

/// Online players on one server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerGroup {
  pub server_id: String,
  pub server_name: String,
  /// True for players online but not on any server.
  pub unassigned: bool,
  pub players: Vec<OnlineProfile>,
}

/// Fill the first `C` of `format` with `clan` and the first `P` with `player`.
fn apply_tag_format(format: &str, clan: &str, player: &str) -> String {
  let mut out = String::with_capacity(format.len() + clan.len() + player.len());
  let (mut clan_done, mut player_done) = (false, false);
  for c in format.chars() {
    match c {
      'C' if !clan_done => {
        out.push_str(clan);
        clan_done = true;
      }
      'P' if !player_done => {
        out.push_str(player);
        player_done = true;
      }
      _ => out.push(c),
    }
  }
  out
}

/// Full name with clan tag applied, e.g. `[TAG]Player`.
pub fn display_name(profile: &OnlineProfile) -> String {
  match profile.tag_format.as_deref() {
    Some(format) if !format.is_empty() && !profile.profile_name.is_empty() => {
      let clan = profile.short_name.as_deref().unwrap_or_default();
      apply_tag_format(format, clan, &profile.profile_name)
    }
    _ if profile.profile_name.is_empty() => UNKNOWN_PLAYER.to_string(),
    _ => profile.profile_name.clone(),
  }
}

/// Split a profile into its clan tag and player name.
///
/// The tag is only produced when format, name and clan short name are all set.
pub fn parse_clan_tag(profile: &OnlineProfile) -> ParsedPlayer {
  match (profile.tag_format.as_deref(), profile.short_name.as_deref()) {
    (Some(format), Some(clan))
      if !format.is_empty() && !clan.is_empty() && !profile.profile_name.is_empty() =>
    {
      ParsedPlayer {
        clan_tag: apply_tag_format(format, clan, "").trim().to_string(),
        player_name: profile.profile_name.clone(),
      }
    }
    _ => ParsedPlayer {
      clan_tag: String::new(),
      player_name: if profile.profile_name.is_empty() {
        UNKNOWN_PLAYER.to_string()
      } else {
        profile.profile_name.clone()
      },
    },
  }
}

fn push_escaped(out: &mut String, text: &str) {
  for c in text.chars() {
    match c {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      '\'' => out.push_str("&#39;"),
      _ => out.push(c),
    }
  }
}

/// Length of a `<#hex>` marker at the start of `s`, and the hex digits.
fn colour_marker(s: &str) -> Option<(usize, &str)> {
  let rest = s.strip_prefix("<#")?;
  let digits = rest
    .bytes()
    .take_while(|b| b.is_ascii_hexdigit())
    .count();
  if !(3..=6).contains(&digits) || rest.as_bytes().get(digits) != Some(&b'>') {
    return None;
  }
  Some((digits + 3, &rest[..digits]))
}

/// Render in-game colour markers (`<#f00>red</>`) as HTML spans.
///
/// Text outside markers is HTML-escaped; malformed markers stay literal text
/// and an unterminated colour is closed at the end.
pub fn colorize(name: &str) -> String {
  let mut out = format!("<span style=\"color:{NEUTRAL_COLOR}\">");
  let mut open = false;
  let mut rest = name;

  while !rest.is_empty() {
    if let Some((len, hex)) = colour_marker(rest) {
      if open {
        out.push_str("</span>");
      }
      out.push_str("<span style=\"color:#");
      out.push_str(&hex.to_ascii_lowercase());
      out.push_str("\">");
      open = true;
      rest = &rest[len..];
    } else if let Some(after) = rest.strip_prefix("</>") {
      if open {
        out.push_str("</span>");
        open = false;
      }
      rest = after;
    } else {
      let first = rest.chars().next().map_or(1, char::len_utf8);
      let next = rest[first..]
        .find('<')
        .map(|i| i + first)
        .unwrap_or(rest.len());
      push_escaped(&mut out, &rest[..next]);
      rest = &rest[next..];
    }
  }

  if open {
    out.push_str("</span>");
  }
  out.push_str("</span>");
  out
}

/// Memoized [`colorize`], shared across request handlers.
pub struct NameCache {
  entries: scc::HashMap<String, String>,
  capacity: usize,
}

impl NameCache {
  pub fn new(capacity: usize) -> Self {
    Self {
      entries: scc::HashMap::new(),
      capacity,
    }
  }

  pub async fn colorize(&self, name: &str) -> String {
    if let Some(html) = self.entries.read_async(name, |_, html| html.clone()).await {
      return html;
    }

    let html = colorize(name);
    // Names churn as players come and go; start over rather than grow forever.
    if self.entries.len() >= self.capacity {
      self.entries.clear_async().await;
    }
    let _ = self.entries.insert_async(name.to_string(), html.clone()).await;
    html
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub async fn clear(&self) {
    self.entries.clear_async().await;
  }
}

impl Default for NameCache {
  fn default() -> Self {
    Self::new(4096)
  }
}

fn compare_names(a: &str, b: &str) -> Ordering {
  a.to_lowercase()
    .cmp(&b.to_lowercase())
    .then_with(|| a.cmp(b))
}

/// Group online players by the server they are on.
///
/// Groups are named from `servers`; players on the unassigned sentinel go in
/// an `"Online"` group and unknown ids get `"Server {id}"`. Players are sorted
/// by display name and groups by server name.
pub fn group_players_by_server(
  profiles: &[OnlineProfile],
  servers: &[ServerEntry],
) -> Vec<PlayerGroup> {
  let names: HashMap<String, &str> = servers
    .iter()
    .map(|s| (s.server_id.to_string(), s.server_name.as_str()))
    .collect();

  let mut groups: Vec<PlayerGroup> = Vec::new();
  let mut index: HashMap<String, usize> = HashMap::new();
  for profile in profiles {
    let server_id = profile.server_id.to_string();
    let slot = *index.entry(server_id.clone()).or_insert_with(|| {
      let unassigned = profile.server_id.is_unassigned();
      let server_name = match names.get(&server_id) {
        Some(name) => name.to_string(),
        None if unassigned => "Online".to_string(),
        None => format!("Server {server_id}"),
      };
      groups.push(PlayerGroup {
        server_id: server_id.clone(),
        server_name,
        unassigned,
        players: Vec::new(),
      });
      groups.len() - 1
    });
    groups[slot].players.push(profile.clone());
  }

  for group in &mut groups {
    group
      .players
      .sort_by_cached_key(|p| (display_name(p).to_lowercase(), display_name(p)));
  }
  groups.sort_by(|a, b| compare_names(&a.server_name, &b.server_name));
  groups
}
