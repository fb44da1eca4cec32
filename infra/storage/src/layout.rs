use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical arrangement of records under the storage root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    /// Every record lives in one shared file as a `key -> fields` map.
    Shared,
    /// Each record owns a directory holding its record file and sibling media.
    #[default]
    #[serde(rename = "folder", alias = "folder-per-record")]
    FolderPerRecord,
    /// Each record is a single file; nothing else belongs to it.
    #[serde(rename = "file", alias = "file-per-record")]
    FilePerRecord,
}

impl LayoutKind {
    #[must_use]
    pub const fn default_pattern(self) -> &'static str {
        match self {
            Self::Shared => "{FOLDER}/{FILE}{EXT}",
            Self::FolderPerRecord => "{FOLDER}/{KEY}/{FILE}{EXT}",
            Self::FilePerRecord => "{FOLDER}/{KEY}{EXT}",
        }
    }

    /// Whether deleting a record may remove its container directory.
    ///
    /// `requested` is the configured policy; only the folder layout honours it.
    #[must_use]
    pub const fn can_delete_container(self, requested: bool) -> bool {
        match self {
            Self::FolderPerRecord => requested,
            Self::Shared | Self::FilePerRecord => false,
        }
    }

    /// Whether a record has a directory of its own that copy/rename must carry along.
    #[must_use]
    pub const fn owns_container(self) -> bool {
        matches!(self, Self::FolderPerRecord)
    }
}

impl fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Shared => "shared",
            Self::FolderPerRecord => "folder",
            Self::FilePerRecord => "file",
        })
    }
}
