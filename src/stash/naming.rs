//! Stash name allocation and ordering
//!
//! Names follow `<prefix><%Y%m%dT%H%M%S>`, optionally followed by `-<n>`
//! when the collision policy allows disambiguation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::time::{format_stash_timestamp, parse_stash_timestamp};

/// What to do when two stashes are created within the same second
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Fail the second trigger
    #[default]
    Reject,
    /// Append `-<n>`, one past the highest suffix issued in that second
    Suffix,
}

#[derive(Debug, Clone)]
pub struct StashNamer {
    prefix: String,
    policy: CollisionPolicy,
}

impl StashNamer {
    pub fn new(prefix: impl Into<String>, policy: CollisionPolicy) -> Self {
        Self {
            prefix: prefix.into(),
            policy,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn base_name(&self, time: &DateTime<Utc>) -> String {
        format!("{}{}", self.prefix, format_stash_timestamp(time))
    }

    /// Suffix of `name` relative to `base`: 0 for the bare base, `n` for `base-n`
    pub fn suffix_of(&self, base: &str, name: &str) -> Option<u32> {
        match name.strip_prefix(base)? {
            "" => Some(0),
            rest => rest.strip_prefix('-')?.parse().ok(),
        }
    }

    /// Allocate a name for `time`; `Err` carries the colliding name.
    ///
    /// `highest` is the largest suffix ever issued for this second (the bare
    /// name counts as 0). Suffixes only grow, so a name freed by retention is
    /// never handed out again and ordering by [`sort_key`](Self::sort_key)
    /// stays chronological.
    pub fn allocate(&self, time: &DateTime<Utc>, highest: Option<u32>) -> Result<(String, u32), String> {
        let base = self.base_name(time);
        let Some(highest) = highest else {
            return Ok((base, 0));
        };

        match self.policy {
            CollisionPolicy::Reject => Err(base),
            CollisionPolicy::Suffix => {
                let n = highest.saturating_add(1);
                Ok((format!("{}-{}", base, n), n))
            }
        }
    }

    /// Split a name into (timestamp part, suffix) for chronological ordering
    pub fn sort_key<'a>(&self, name: &'a str) -> (&'a str, u32) {
        let rest = name.strip_prefix(self.prefix.as_str()).unwrap_or(name);
        if let Some((stamp, suffix)) = rest.rsplit_once('-') {
            if let Ok(n) = suffix.parse::<u32>() {
                if parse_stash_timestamp(stamp).is_some() {
                    return (stamp, n);
                }
            }
        }
        (rest, 0)
    }

    /// Creation time encoded in a name, if any
    pub fn created_at(&self, name: &str) -> Option<DateTime<Utc>> {
        let (stamp, _) = self.sort_key(name);
        parse_stash_timestamp(stamp)
    }
}
