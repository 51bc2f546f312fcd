// Scenario catalog: immutable question/scene content loaded once at startup.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Designated terminal marker an adventure choice may name instead of an item id.
pub const END_MARKER: &str = "end";

/// Which game the catalog drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// Threshold quiz: every choice is graded, score decides the outcome.
    Quiz,
    /// Scene graph: every choice names the next scene, endings have no choices.
    Adventure,
}

impl std::fmt::Display for GameMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameMode::Quiz => write!(f, "quiz"),
            GameMode::Adventure => write!(f, "adventure"),
        }
    }
}

/// One question or scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

/// A labeled option on an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub id: String,
    pub text: String,
    #[serde(flatten)]
    pub effect: ChoiceEffect,
}

/// What picking a choice does. Quiz catalogs grade, adventure catalogs branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChoiceEffect {
    Grade {
        correct: bool,
        why: String,
    },
    Goto {
        next: String,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        score: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        why: Option<String>,
    },
}

/// On-disk catalog file shape.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    name: String,
    mode: GameMode,
    items: Vec<Item>,
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read catalog file at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse catalog file at {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("catalog '{catalog}' is invalid: {reason}")]
    Invalid { catalog: String, reason: String },
}

/// Lookup failure for an item id that is not in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("item '{0}' not found in catalog")]
pub struct NotFound(pub String);

/// Immutable scenario collection. Safe to share across threads without locking.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub name: String,
    pub mode: GameMode,
    items: HashMap<String, Item>,
    order: Vec<String>,
}

impl Catalog {
    /// Load and validate a single catalog file.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let contents = fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&path.display().to_string(), &contents)
    }

    /// Parse and validate catalog JSON. `label` is only used in error messages.
    pub fn from_json(label: &str, contents: &str) -> Result<Self, LoadError> {
        let file: CatalogFile =
            serde_json::from_str(contents).map_err(|source| LoadError::Parse {
                path: label.to_string(),
                source,
            })?;
        Self::validate(file)
    }

    /// Scan a directory for `*.json` catalog files, sorted by catalog name.
    /// Any malformed file fails the whole load; catalogs are startup-fatal.
    pub fn load_dir(dir: &Path) -> Result<Vec<Self>, LoadError> {
        let entries = fs::read_dir(dir).map_err(|source| LoadError::Read {
            path: dir.display().to_string(),
            source,
        })?;

        let mut catalogs = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            catalogs.push(Self::load(&path)?);
        }

        catalogs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(catalogs)
    }

    fn validate(file: CatalogFile) -> Result<Self, LoadError> {
        let invalid = |reason: String| LoadError::Invalid {
            catalog: file.name.clone(),
            reason,
        };

        if file.name.is_empty() {
            return Err(LoadError::Invalid {
                catalog: "<unnamed>".to_string(),
                reason: "catalog name must not be empty".to_string(),
            });
        }
        if file.items.is_empty() {
            return Err(invalid("catalog has no items".to_string()));
        }

        let mut ids = HashSet::new();
        for item in &file.items {
            if !ids.insert(item.id.as_str()) {
                return Err(invalid(format!("duplicate item id '{}'", item.id)));
            }
        }

        for item in &file.items {
            let mut choice_ids = HashSet::new();
            for choice in &item.choices {
                if !choice_ids.insert(choice.id.as_str()) {
                    return Err(invalid(format!(
                        "item '{}' has duplicate choice id '{}'",
                        item.id, choice.id
                    )));
                }
                match (&file.mode, &choice.effect) {
                    (GameMode::Quiz, ChoiceEffect::Goto { .. }) => {
                        return Err(invalid(format!(
                            "quiz item '{}' has a branching choice '{}'",
                            item.id, choice.id
                        )));
                    }
                    (GameMode::Adventure, ChoiceEffect::Grade { .. }) => {
                        return Err(invalid(format!(
                            "adventure item '{}' has a graded choice '{}'",
                            item.id, choice.id
                        )));
                    }
                    (GameMode::Adventure, ChoiceEffect::Goto { next, .. }) => {
                        if next != END_MARKER && !ids.contains(next.as_str()) {
                            return Err(invalid(format!(
                                "item '{}' choice '{}' references unknown item '{}'",
                                item.id, choice.id, next
                            )));
                        }
                    }
                    (GameMode::Quiz, ChoiceEffect::Grade { .. }) => {}
                }
            }

            if file.mode == GameMode::Quiz {
                if item.choices.is_empty() {
                    return Err(invalid(format!("quiz item '{}' has no choices", item.id)));
                }
                let has_correct = item.choices.iter().any(|c| {
                    matches!(c.effect, ChoiceEffect::Grade { correct: true, .. })
                });
                if !has_correct {
                    return Err(invalid(format!(
                        "quiz item '{}' has no correct choice",
                        item.id
                    )));
                }
            }
        }

        let order: Vec<String> = file.items.iter().map(|i| i.id.clone()).collect();
        let items = file
            .items
            .into_iter()
            .map(|i| (i.id.clone(), i))
            .collect();

        Ok(Catalog {
            name: file.name,
            mode: file.mode,
            items,
            order,
        })
    }

    /// Look up an item by id.
    pub fn get(&self, id: &str) -> Result<&Item, NotFound> {
        self.items.get(id).ok_or_else(|| NotFound(id.to_string()))
    }

    /// The first listed item; adventure play-throughs start here.
    pub fn root(&self) -> &Item {
        &self.items[&self.order[0]]
    }

    /// Item ids in authored order.
    pub fn item_ids(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
