//! JSON payloads exchanged with the management platform.

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Response to a full-descendant discovery request.
///
/// The listing is flat: every descendant of the requested container, split
/// into result groups keyed by resource type tag (`m2m:cnt`, `m2m:cin`,
/// ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    #[serde(rename = "m2m:rsp", default)]
    pub groups: IndexMap<String, ResultGroup>,
}

/// One result group. Anything that is not an array of entries is kept
/// only so the rest of the response still decodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultGroup {
    Entries(Vec<GroupItem>),
    Other(serde_json::Value),
}

/// One element of a result group.
///
/// Elements that do not decode as an entry are kept apart, so one bad
/// record does not hide its siblings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupItem {
    Entry(ListingEntry),
    Malformed(serde_json::Value),
}

/// A single resource in a listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingEntry {
    /// Resource name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rn: Option<CompactString>,
    /// Resource identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ri: Option<CompactString>,
    /// Parent resource identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pi: Option<CompactString>,
    /// Content; present only on content instances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub con: Option<serde_json::Value>,
}

impl Listing {
    /// Iterate over every well-formed entry of every array-valued group.
    ///
    /// Skipped groups and entries are logged.
    pub fn entries(&self) -> impl Iterator<Item = &ListingEntry> {
        self.groups.iter().flat_map(|(tag, group)| {
            let items: &[GroupItem] = match group {
                ResultGroup::Entries(items) => items,
                ResultGroup::Other(_) => {
                    tracing::warn!(group = %tag, "result group is not an array, skipping it");
                    &[]
                }
            };
            items.iter().filter_map(move |item| match item {
                GroupItem::Entry(entry) => Some(entry),
                GroupItem::Malformed(value) => {
                    tracing::warn!(group = %tag, entry = %value, "skipping malformed listing entry");
                    None
                }
            })
        })
    }

    /// Append `entry` to the group tagged `tag`.
    pub fn push(&mut self, tag: &str, entry: ListingEntry) {
        let group = self
            .groups
            .entry(tag.to_string())
            .or_insert_with(|| ResultGroup::Entries(Vec::new()));
        match group {
            ResultGroup::Entries(items) => items.push(GroupItem::Entry(entry)),
            ResultGroup::Other(_) => *group = ResultGroup::Entries(vec![GroupItem::Entry(entry)]),
        }
    }
}

/// Response to a request on the base address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseResponse {
    #[serde(rename = "m2m:cb", default, skip_serializing_if = "Option::is_none")]
    pub base: Option<BaseDescriptor>,
}

/// Name and identifier of the base container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseDescriptor {
    pub rn: CompactString,
    pub ri: CompactString,
}
