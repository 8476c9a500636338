//! Composable task properties.
//!
//! Optional task metadata — a human-readable label, a scheduler routing tag,
//! free-form key/value entries — is kept in independently addressable
//! fragments rather than one monolithic struct. Each fragment defines its own
//! patch type, and [`TaskProperties::apply_patch`] merges field-wise, so a
//! nested modification can touch one fragment without knowing about the
//! others. Tasks assemble their properties through the task builder; there is
//! no inheritance chain to thread a new fragment through.

use indexmap::IndexMap;

/// A property fragment: a self-contained piece of task metadata with its own
/// patch operation.
pub trait PropertyFragment: Default {
    /// The partial update applied by [`apply_patch`](Self::apply_patch).
    type Patch: Default;

    /// Merge `patch` into this fragment. Absent patch fields leave the
    /// fragment untouched.
    fn apply_patch(&mut self, patch: &Self::Patch);
}

/// Human-readable task label, for logs and debugging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelProperty {
    /// The label, if one was set.
    pub label: Option<String>,
}

/// Partial update of a [`LabelProperty`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelPatch {
    /// New label; `None` leaves the current one in place.
    pub label: Option<String>,
}

impl PropertyFragment for LabelProperty {
    type Patch = LabelPatch;

    fn apply_patch(&mut self, patch: &Self::Patch) {
        if let Some(label) = &patch.label {
            self.label = Some(label.clone());
        }
    }
}

/// Scheduler routing tag.
///
/// The core never interprets the tag; an external scheduler may use it to
/// route ready tasks to specific execution contexts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagProperty {
    /// The tag, if one was set.
    pub tag: Option<u64>,
}

/// Partial update of a [`TagProperty`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagPatch {
    /// New tag; `None` leaves the current one in place.
    pub tag: Option<u64>,
}

impl PropertyFragment for TagProperty {
    type Patch = TagPatch;

    fn apply_patch(&mut self, patch: &Self::Patch) {
        if let Some(tag) = patch.tag {
            self.tag = Some(tag);
        }
    }
}

/// Free-form key/value entries, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomProperties {
    /// The entries. Insertion order is preserved.
    pub entries: IndexMap<String, String>,
}

/// Partial update of [`CustomProperties`]: entries to insert or overwrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomPatch {
    /// Entries merged into the bag; existing keys are overwritten.
    pub entries: IndexMap<String, String>,
}

impl PropertyFragment for CustomProperties {
    type Patch = CustomPatch;

    fn apply_patch(&mut self, patch: &Self::Patch) {
        for (key, value) in &patch.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }
}

/// The composed property bag every task carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskProperties {
    /// Label fragment.
    pub label: LabelProperty,
    /// Scheduler tag fragment.
    pub tag: TagProperty,
    /// Custom key/value fragment.
    pub custom: CustomProperties,
}

/// Partial update across all fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPropertiesPatch {
    /// Label fragment patch.
    pub label: LabelPatch,
    /// Scheduler tag fragment patch.
    pub tag: TagPatch,
    /// Custom fragment patch.
    pub custom: CustomPatch,
}

impl TaskProperties {
    /// Merge `patch` into the bag, fragment by fragment.
    pub fn apply_patch(&mut self, patch: &TaskPropertiesPatch) {
        self.label.apply_patch(&patch.label);
        self.tag.apply_patch(&patch.tag);
        self.custom.apply_patch(&patch.custom);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_patch_changes_nothing() {
        let mut props = TaskProperties::default();
        props.label.label = Some("stencil".into());
        props.tag.tag = Some(3);

        let before = props.clone();
        props.apply_patch(&TaskPropertiesPatch::default());
        assert_eq!(props, before);
    }

    #[test]
    fn patch_merges_field_wise() {
        let mut props = TaskProperties::default();
        props.label.label = Some("old".into());
        props.custom.entries.insert("stage".into(), "one".into());

        let patch = TaskPropertiesPatch {
            label: LabelPatch {
                label: Some("new".into()),
            },
            tag: TagPatch { tag: Some(7) },
            custom: CustomPatch {
                entries: IndexMap::from([("stage".into(), "two".into())]),
            },
        };
        props.apply_patch(&patch);

        assert_eq!(props.label.label.as_deref(), Some("new"));
        assert_eq!(props.tag.tag, Some(7));
        assert_eq!(props.custom.entries.get("stage").map(String::as_str), Some("two"));
    }

    #[test]
    fn custom_entries_keep_insertion_order() {
        let mut custom = CustomProperties::default();
        custom.entries.insert("b".into(), "1".into());
        custom.entries.insert("a".into(), "2".into());
        let keys: Vec<_> = custom.entries.keys().cloned().collect();
        assert_eq!(keys, vec!["b".to_string(), "a".to_string()]);
    }
}
