//! Static rule tables consulted by the router and the resolver.
//!
//! Both tables are plain immutable values handed to their consumers at
//! construction. `Default` yields the standard production tables; config
//! files may replace either one wholesale.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::core::Department;
use crate::error::Result;

/// Department → set of prerequisite departments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRules {
    rules: BTreeMap<Department, BTreeSet<Department>>,
}

impl DependencyRules {
    /// An empty table: no department depends on anything.
    pub fn new() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// Declare that `department` requires every department in `prerequisites`.
    ///
    /// Rules accumulate; declaring the same department twice unions the sets.
    pub fn with_rule(
        mut self,
        department: Department,
        prerequisites: impl IntoIterator<Item = Department>,
    ) -> Self {
        self.rules
            .entry(department)
            .or_default()
            .extend(prerequisites);
        self
    }

    /// Build a table from department names, as found in a config file.
    ///
    /// # Errors
    /// Returns `UnknownDepartment` for any name that is not a department.
    pub fn from_names(table: &HashMap<String, Vec<String>>) -> Result<Self> {
        let mut rules = Self::new();
        for (department, prerequisites) in table {
            let department: Department = department.parse()?;
            let prerequisites = prerequisites
                .iter()
                .map(|p| p.parse::<Department>())
                .collect::<Result<Vec<_>>>()?;
            rules = rules.with_rule(department, prerequisites);
        }
        Ok(rules)
    }

    /// Prerequisites declared for a department (empty if none).
    pub fn prerequisites(&self, department: Department) -> impl Iterator<Item = Department> + '_ {
        self.rules
            .get(&department)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Whether a rule directly declares `department` to require `prerequisite`.
    pub fn depends_on(&self, department: Department, prerequisite: Department) -> bool {
        self.rules
            .get(&department)
            .is_some_and(|set| set.contains(&prerequisite))
    }

    /// Whether a rule links the two departments in either direction.
    pub fn linked(&self, a: Department, b: Department) -> bool {
        self.depends_on(a, b) || self.depends_on(b, a)
    }
}

impl Default for DependencyRules {
    fn default() -> Self {
        use Department::*;
        Self::new()
            .with_rule(Visual, [Character])
            .with_rule(ImageQuality, [Visual])
            .with_rule(Audio, [Character])
            .with_rule(Production, [Story, Visual, Audio])
    }
}

/// A single lexical cue contributing to a department's relevance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordCue {
    pub keyword: String,
    pub weight: f64,
}

impl KeywordCue {
    pub fn new(keyword: &str, weight: f64) -> Self {
        Self {
            keyword: keyword.to_string(),
            weight,
        }
    }
}

/// Department → weighted keyword cues used by the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceTable {
    cues: BTreeMap<Department, Vec<KeywordCue>>,
}

impl RelevanceTable {
    pub fn new() -> Self {
        Self {
            cues: BTreeMap::new(),
        }
    }

    pub fn with_cues(mut self, department: Department, cues: &[(&str, f64)]) -> Self {
        self.cues
            .entry(department)
            .or_default()
            .extend(cues.iter().map(|(k, w)| KeywordCue::new(k, *w)));
        self
    }

    /// Build a table from department names, as found in a config file.
    pub fn from_names(table: &HashMap<String, Vec<KeywordCue>>) -> Result<Self> {
        let mut cues = BTreeMap::new();
        for (department, list) in table {
            let department: Department = department.parse()?;
            cues.insert(department, list.clone());
        }
        Ok(Self { cues })
    }

    pub fn cues(&self, department: Department) -> &[KeywordCue] {
        self.cues.get(&department).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Default for RelevanceTable {
    fn default() -> Self {
        use Department::*;
        Self::new()
            .with_cues(
                Character,
                &[
                    ("character", 0.6),
                    ("protagonist", 0.5),
                    ("hero", 0.4),
                    ("villain", 0.4),
                    ("persona", 0.4),
                    ("personality", 0.4),
                ],
            )
            .with_cues(
                Story,
                &[
                    ("story", 0.6),
                    ("plot", 0.5),
                    ("narrative", 0.5),
                    ("script", 0.4),
                    ("dialogue", 0.4),
                    ("scene", 0.3),
                ],
            )
            .with_cues(
                Visual,
                &[
                    ("visual", 0.6),
                    ("image", 0.5),
                    ("illustration", 0.5),
                    ("portrait", 0.5),
                    ("concept art", 0.5),
                    ("design", 0.3),
                ],
            )
            .with_cues(
                ImageQuality,
                &[
                    ("image quality", 0.6),
                    ("upscale", 0.6),
                    ("resolution", 0.5),
                    ("enhance", 0.5),
                    ("sharpen", 0.5),
                ],
            )
            .with_cues(
                Audio,
                &[
                    ("voice", 0.6),
                    ("audio", 0.6),
                    ("sound", 0.5),
                    ("music", 0.5),
                    ("narration", 0.4),
                ],
            )
            .with_cues(
                Production,
                &[
                    ("video", 0.6),
                    ("production", 0.5),
                    ("animation", 0.5),
                    ("trailer", 0.5),
                    ("episode", 0.4),
                    ("render", 0.4),
                ],
            )
    }
}
