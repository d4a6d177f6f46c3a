//! Project identity as stored in the catalog.

use serde::{Deserialize, Serialize};

/// A project row resolved by name before ingestion begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    /// Numeric project key referenced by layer rows
    pub project_id_number: i64,

    /// Human-readable project name
    pub project_name: String,

    /// Parent project key when this project is a sub-project package
    pub parent_project_id_number: Option<i64>,
}

impl ProjectRef {
    /// Project that owns aerial imagery rows: the parent when present,
    /// otherwise the project itself.
    pub fn owning_project_id(&self) -> i64 {
        self.parent_project_id_number.unwrap_or(self.project_id_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owning_project_prefers_parent() {
        let sub = ProjectRef {
            project_id_number: 204,
            project_name: "Harbour Stage 2".to_string(),
            parent_project_id_number: Some(200),
        };
        assert_eq!(sub.owning_project_id(), 200);

        let top = ProjectRef {
            project_id_number: 200,
            project_name: "Harbour".to_string(),
            parent_project_id_number: None,
        };
        assert_eq!(top.owning_project_id(), 200);
    }
}
