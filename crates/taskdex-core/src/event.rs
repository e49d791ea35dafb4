use serde::{Deserialize, Serialize};

/// File-system notification forwarded by the host environment.
///
/// The index never watches files itself; hosts translate their own change
/// notifications into these values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FileEvent {
    /// A new file appeared.
    Created {
        /// Path of the file.
        path: String,
        /// Modification time reported by the host, when known.
        #[serde(default)]
        mtime: Option<i64>,
    },
    /// An existing file was written.
    Modified {
        /// Path of the file.
        path: String,
        /// Modification time reported by the host, when known.
        #[serde(default)]
        mtime: Option<i64>,
    },
    /// A file was deleted.
    Deleted {
        /// Path of the file.
        path: String,
    },
}

impl FileEvent {
    /// Path the event refers to.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Created { path, .. } | Self::Modified { path, .. } | Self::Deleted { path } => path,
        }
    }

    /// Reported modification time, if any.
    #[must_use]
    pub const fn mtime(&self) -> Option<i64> {
        match self {
            Self::Created { mtime, .. } | Self::Modified { mtime, .. } => *mtime,
            Self::Deleted { .. } => None,
        }
    }
}
