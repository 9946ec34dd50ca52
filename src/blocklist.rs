// Block List Store (C1) — the seed CSV of flagged accounts.
//
// Reads a CSV of `(did, reason_type, reason)`, preserving source line order
// as each item's `index`. Tolerates 2- or 3-column rows and skips anything
// whose first field doesn't look like a DID. Ground truth for the merge and
// "bad DID" rules is `original_source/pythonic/.../blocklist.py`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use tracing::info;

/// The five moderation reason kinds that always count as "bad", per spec §3.
const BAD_REASON_TYPES: [&str; 5] = [
    "com.atproto.moderation.defs#reasonMisleading",
    "com.atproto.moderation.defs#reasonRude",
    "com.atproto.moderation.defs#reasonSexual",
    "com.atproto.moderation.defs#reasonSpam",
    "com.atproto.moderation.defs#reasonViolation",
];

/// A single entry in the block-list CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockListItem {
    /// Stable insertion order — the CSV write order.
    pub index: usize,
    pub did: String,
    pub reason_type: String,
    pub reason: String,
}

impl BlockListItem {
    /// Merge an incoming `(reason_type, reason)` pair into this item, per
    /// spec §3: reasons are joined by `,`; if the incoming kind differs from
    /// the stored one, it's annotated in parentheses before its reason text;
    /// the first non-empty `reason_type` wins.
    fn merge_with(&mut self, reason_kind: &str, reason: &str) {
        if !reason.is_empty() {
            if !self.reason.is_empty() {
                self.reason.push(',');
            }
            if !self.reason_type.is_empty() && !reason_kind.is_empty() && reason_kind != self.reason_type {
                self.reason.push('(');
                self.reason.push_str(reason_kind);
                self.reason.push(')');
            }
            self.reason.push_str(reason);
        }
        if self.reason_type.is_empty() {
            self.reason_type = reason_kind.to_string();
        }
    }
}

/// The block-list store: an insertion-ordered map keyed by DID.
pub struct BlockList {
    path: PathBuf,
    items: BTreeMap<String, BlockListItem>,
    next_index: usize,
    default_bad: bool,
}

impl BlockList {
    /// Read the block-list CSV at `path`. Missing files are treated as empty
    /// — a first run has nothing to seed from yet.
    pub fn read(path: impl AsRef<Path>, default_bad: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut items = BTreeMap::new();
        let mut next_index = 0usize;

        if path.exists() {
            let mut reader = ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_path(&path)
                .with_context(|| format!("failed to open block list {}", path.display()))?;

            for (i, record) in reader.records().enumerate() {
                let record = record.with_context(|| format!("malformed row in {}", path.display()))?;
                next_index = i + 1;

                let did = record.get(0).unwrap_or_default();
                if !did.starts_with("did:") {
                    continue;
                }

                let (reason_type, reason) = if record.len() >= 3 {
                    (record.get(1).unwrap_or_default(), record.get(2).unwrap_or_default().to_string())
                } else {
                    let reason = record
                        .iter()
                        .skip(1)
                        .filter(|s| !s.is_empty())
                        .collect::<Vec<_>>()
                        .join(",");
                    ("", reason)
                };

                match items.get_mut(did) {
                    Some(existing) => {
                        info!(did, "merging blocklist item");
                        let existing: &mut BlockListItem = existing;
                        existing.merge_with(reason_type, &reason);
                    }
                    None => {
                        items.insert(
                            did.to_string(),
                            BlockListItem {
                                index: i,
                                did: did.to_string(),
                                reason_type: reason_type.to_string(),
                                reason,
                            },
                        );
                    }
                }
            }
        }

        Ok(Self {
            path,
            items,
            next_index,
            default_bad,
        })
    }

    /// Write the block list back out, sorted by `index`, 3 columns per row.
    pub fn write(&self) -> Result<()> {
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_path(&self.path)
            .with_context(|| format!("failed to write block list {}", self.path.display()))?;

        let mut sorted: Vec<&BlockListItem> = self.items.values().collect();
        sorted.sort_by_key(|item| item.index);

        for item in sorted {
            writer.write_record([&item.did, &item.reason_type, &item.reason])?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Merge `(did, reason_type, reason)` into the block list, following the
    /// same merge rule as duplicate rows encountered on read.
    pub fn add(&mut self, did: &str, reason_type: &str, reason: &str) {
        match self.items.get_mut(did) {
            Some(existing) => existing.merge_with(reason_type, reason),
            None => {
                self.items.insert(
                    did.to_string(),
                    BlockListItem {
                        index: self.next_index,
                        did: did.to_string(),
                        reason_type: reason_type.to_string(),
                        reason: reason.to_string(),
                    },
                );
                self.next_index += 1;
            }
        }
    }

    /// Prefix the item's reason with `(account removed)`, preserving prior
    /// content, unless already prefixed. Used to annotate DIDs the crawl
    /// engine reported as terminally not found (spec §7).
    pub fn mark_removed(&mut self, did: &str) {
        const MARKER: &str = "(account removed)";
        if let Some(item) = self.items.get_mut(did) {
            if !item.reason.contains(MARKER) {
                item.reason = format!("{MARKER}{}", item.reason);
            }
        }
    }

    /// The subset of DIDs whose `reason_type` falls in the fixed "bad" set,
    /// plus — if `default_bad` is enabled — DIDs with an empty `reason_type`.
    pub fn bad_dids(&self) -> Vec<String> {
        self.items
            .values()
            .filter(|item| {
                BAD_REASON_TYPES.contains(&item.reason_type.as_str())
                    || (self.default_bad && item.reason_type.is_empty())
            })
            .map(|item| item.did.clone())
            .collect()
    }

    pub fn get(&self, did: &str) -> Option<&BlockListItem> {
        self.items.get(did)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
