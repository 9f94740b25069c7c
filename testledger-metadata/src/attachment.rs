// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

/// A content-addressed attachment descriptor.
///
/// The ID is a hash of the original file name, so a link reported by a test
/// step and the physical file that arrives separately resolve to the same
/// descriptor regardless of which shows up first.
///
/// * `used` is true once a test result, fixture or global record refers to the
///   attachment.
/// * `missed` is true while the physical bytes have not arrived.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct AttachmentLink {
    /// Hash of `original_file_name`.
    pub id: String,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The file name the attachment was reported under.
    pub original_file_name: String,

    /// MIME type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// File extension including the leading dot, e.g. `.png`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,

    /// Size of the content in bytes, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,

    /// Whether anything refers to this attachment.
    pub used: bool,

    /// Whether the physical file is still missing.
    pub missed: bool,
}

impl AttachmentLink {
    /// Merges another descriptor for the same ID into this one.
    ///
    /// The physical file having arrived on either side wins, as does a
    /// reference from either side. Missing descriptive fields are filled in
    /// from `other`.
    pub fn merge(&mut self, other: &AttachmentLink) {
        debug_assert_eq!(self.id, other.id, "merged links must share an ID");
        if !other.missed && self.missed {
            self.content_length = other.content_length.or(self.content_length);
        }
        self.used |= other.used;
        self.missed &= other.missed;
        if self.name.is_none() {
            self.name.clone_from(&other.name);
        }
        if self.content_type.is_none() {
            self.content_type.clone_from(&other.content_type);
        }
        if self.ext.is_none() {
            self.ext.clone_from(&other.ext);
        }
        if self.content_length.is_none() {
            self.content_length = other.content_length;
        }
    }
}
