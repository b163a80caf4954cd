use crate::error::Result;
use crate::types::Decision;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Converts a work item id into a decision. The business rules behind it are
/// an external collaborator; the scheduler only forwards what comes back.
pub trait DecisionSource: Send + Sync {
    fn decide(&self, item_id: &str) -> Result<Decision>;
}

/// Decision source backed by a flat lookup table loaded from a YAML file
/// (`item id → decision`). Items missing from the table resolve to `Unsure`
/// so the session keeps moving instead of stalling on unknown work.
pub struct TableDecisionSource {
    table: HashMap<String, Decision>,
}

impl TableDecisionSource {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let table: HashMap<String, Decision> = serde_yaml::from_str(&data)?;
        info!(items = table.len(), path = %path.display(), "loaded decision table");
        Ok(Self { table })
    }

    pub fn from_table(table: HashMap<String, Decision>) -> Self {
        Self { table }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl DecisionSource for TableDecisionSource {
    fn decide(&self, item_id: &str) -> Result<Decision> {
        Ok(self.table.get(item_id).cloned().unwrap_or(Decision::Unsure {
            notes: "Item not present in decision table.".to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn load_and_decide() {
        let mut f = NamedTempFile::new().unwrap();
        write!(
            f,
            r#"
task-1:
  action: accept
  notes: looks good
task-2:
  action: revise
  notes: partial
  revision_notes: fix step 3
"#
        )
        .unwrap();

        let source = TableDecisionSource::load(f.path()).unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(
            source.decide("task-1").unwrap(),
            Decision::Accept {
                notes: "looks good".into()
            }
        );
        assert_eq!(
            source.decide("task-2").unwrap().applied_status(),
            "Needs Revision"
        );
    }

    #[test]
    fn unknown_item_resolves_unsure() {
        let source = TableDecisionSource::from_table(HashMap::new());
        let d = source.decide("nope").unwrap();
        assert!(matches!(d, Decision::Unsure { .. }));
    }
}
