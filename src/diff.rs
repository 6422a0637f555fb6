use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::template::{Resource, Template};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Added,
    Removed,
    /// Type changed; CloudFormation replaces the resource
    Replaced { from: String, to: String },
    /// Names of the top-level properties or attributes that differ
    Modified(Vec<String>),
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Added => write!(f, "added"),
            Change::Removed => write!(f, "removed"),
            Change::Replaced { from, to } => write!(f, "replaced ({} → {})", from, to),
            Change::Modified(fields) => write!(f, "modified ({})", fields.join(", ")),
        }
    }
}

/// Differences between a deployed (or previously written) template and a new one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateDiff {
    pub resources: BTreeMap<String, Change>,
    pub parameters: BTreeMap<String, Change>,
    pub outputs: BTreeMap<String, Change>,
    pub description_changed: bool,
}

impl TemplateDiff {
    pub fn between(old: &Template, new: &Template) -> Self {
        Self {
            resources: diff_maps(&old.resources, &new.resources, resource_change),
            parameters: diff_maps(&old.parameters, &new.parameters, |old, new| {
                (old != new).then(|| Change::Modified(vec!["Definition".to_string()]))
            }),
            outputs: diff_maps(&old.outputs, &new.outputs, |old, new| {
                let mut fields = Vec::new();
                if old.value != new.value {
                    fields.push("Value".to_string());
                }
                if old.description != new.description {
                    fields.push("Description".to_string());
                }
                if old.export != new.export {
                    fields.push("Export".to_string());
                }
                (!fields.is_empty()).then_some(Change::Modified(fields))
            }),
            description_changed: old.description != new.description,
        }
    }

    /// Everything in `new` counts as added
    pub fn against_nothing(new: &Template) -> Self {
        Self::between(&Template::new(new.description.clone()), new)
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
            && self.parameters.is_empty()
            && self.outputs.is_empty()
            && !self.description_changed
    }

    pub fn change_count(&self) -> usize {
        self.resources.len()
            + self.parameters.len()
            + self.outputs.len()
            + usize::from(self.description_changed)
    }
}

fn diff_maps<T>(
    old: &BTreeMap<String, T>,
    new: &BTreeMap<String, T>,
    compare: impl Fn(&T, &T) -> Option<Change>,
) -> BTreeMap<String, Change> {
    let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    keys.into_iter()
        .filter_map(|key| {
            let change = match (old.get(key), new.get(key)) {
                (None, Some(_)) => Some(Change::Added),
                (Some(_), None) => Some(Change::Removed),
                (Some(old), Some(new)) => compare(old, new),
                (None, None) => None,
            };
            change.map(|c| (key.clone(), c))
        })
        .collect()
}

fn resource_change(old: &Resource, new: &Resource) -> Option<Change> {
    if old.type_name != new.type_name {
        return Some(Change::Replaced {
            from: old.type_name.clone(),
            to: new.type_name.clone(),
        });
    }

    let mut fields = changed_properties(&old.properties, &new.properties);
    if old.depends_on != new.depends_on {
        fields.push("DependsOn".to_string());
    }
    if old.deletion_policy != new.deletion_policy {
        fields.push("DeletionPolicy".to_string());
    }
    if old.update_replace_policy != new.update_replace_policy {
        fields.push("UpdateReplacePolicy".to_string());
    }

    (!fields.is_empty()).then_some(Change::Modified(fields))
}

fn changed_properties(old: &Value, new: &Value) -> Vec<String> {
    let empty = serde_json::Map::new();
    let old = old.as_object().unwrap_or(&empty);
    let new = new.as_object().unwrap_or(&empty);

    let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    keys.into_iter()
        .filter(|key| old.get(*key) != new.get(*key))
        .cloned()
        .collect()
}
