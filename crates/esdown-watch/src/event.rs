//! File change events.
//!
//! Raw backend notifications are noisy and platform-dependent. This module
//! reduces them to the three changes an asset pipeline cares about: a file
//! appeared, a file changed, a file went away.

use std::path::{Path, PathBuf};

use notify::event::{EventKind, ModifyKind};

/// A change to a single file under a watched root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileChange {
    /// The file was created.
    Created(PathBuf),

    /// The file's contents were modified.
    Modified(PathBuf),

    /// The file was deleted.
    Deleted(PathBuf),
}

impl FileChange {
    /// The path the change applies to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Created(path) | Self::Modified(path) | Self::Deleted(path) => path,
        }
    }

    /// A stable lowercase name for the change kind, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Modified(_) => "modified",
            Self::Deleted(_) => "deleted",
        }
    }

    /// Map a raw backend event to zero or more file changes.
    ///
    /// Creations and removals map directly. Data modifications map to
    /// [`FileChange::Modified`]. Ambiguous modification events (renames,
    /// catch-all kinds) are disambiguated by checking whether the path still
    /// exists. Metadata and access events are discarded.
    #[must_use]
    pub fn from_notify(event: &notify::Event) -> Vec<FileChange> {
        let mut changes = Vec::new();
        for path in &event.paths {
            let change = match event.kind {
                EventKind::Create(_) => Some(Self::Created(path.clone())),
                EventKind::Modify(ModifyKind::Data(_)) => Some(Self::Modified(path.clone())),
                EventKind::Modify(ModifyKind::Metadata(_)) | EventKind::Access(_) => None,
                EventKind::Modify(_) | EventKind::Any => {
                    if path.exists() {
                        Some(Self::Modified(path.clone()))
                    } else {
                        Some(Self::Deleted(path.clone()))
                    }
                }
                EventKind::Remove(_) => Some(Self::Deleted(path.clone())),
                EventKind::Other => None,
            };
            if let Some(change) = change {
                changes.push(change);
            }
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use notify::event::{
        AccessKind, CreateKind, DataChange, Event, MetadataKind, RemoveKind, RenameMode,
    };

    #[test]
    fn test_path_and_kind() {
        let change = FileChange::Created(PathBuf::from("/tmp/a.js"));
        assert_eq!(change.path(), Path::new("/tmp/a.js"));
        assert_eq!(change.kind(), "created");

        assert_eq!(FileChange::Modified(PathBuf::from("x")).kind(), "modified");
        assert_eq!(FileChange::Deleted(PathBuf::from("x")).kind(), "deleted");
    }

    #[test]
    fn test_from_notify_create() {
        let event = Event::new(EventKind::Create(CreateKind::File)).add_path("/tmp/a.js".into());
        let changes = FileChange::from_notify(&event);
        assert_eq!(changes, vec![FileChange::Created(PathBuf::from("/tmp/a.js"))]);
    }

    #[test]
    fn test_from_notify_data_modify() {
        let event = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path("/tmp/a.js".into());
        let changes = FileChange::from_notify(&event);
        assert_eq!(
            changes,
            vec![FileChange::Modified(PathBuf::from("/tmp/a.js"))]
        );
    }

    #[test]
    fn test_from_notify_remove() {
        let event = Event::new(EventKind::Remove(RemoveKind::File)).add_path("/tmp/a.js".into());
        let changes = FileChange::from_notify(&event);
        assert_eq!(changes, vec![FileChange::Deleted(PathBuf::from("/tmp/a.js"))]);
    }

    #[test]
    fn test_from_notify_metadata_and_access_discarded() {
        let metadata = Event::new(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)))
            .add_path("/tmp/a.js".into());
        assert!(FileChange::from_notify(&metadata).is_empty());

        let access = Event::new(EventKind::Access(AccessKind::Any)).add_path("/tmp/a.js".into());
        assert!(FileChange::from_notify(&access).is_empty());
    }

    #[test]
    fn test_from_notify_ambiguous_missing_path_is_deleted() {
        // A rename of a path that no longer exists reads as a deletion.
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Any)))
            .add_path("/tmp/definitely-not-present-esdown-test.js".into());
        let changes = FileChange::from_notify(&event);
        assert_eq!(
            changes,
            vec![FileChange::Deleted(PathBuf::from(
                "/tmp/definitely-not-present-esdown-test.js"
            ))]
        );
    }

    #[test]
    fn test_from_notify_multiple_paths() {
        let event = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path("/tmp/a.js".into())
            .add_path("/tmp/b.js".into());
        let changes = FileChange::from_notify(&event);
        assert_eq!(changes.len(), 2);
    }
}
