//! Project operations. Projects are immutable after create except for the
//! description.

use foreman_core::types::Project;
use foreman_core::EngineError;
use foreman_store::repository::ProjectRepo;

use crate::lifecycle::LifecycleEngine;
use crate::queries::QueryEngine;

impl LifecycleEngine {
    /// Create a project with a unique name.
    pub fn create_project(
        &self,
        name: &str,
        local_path: Option<&str>,
        origin_url: Option<&str>,
        description: Option<&str>,
    ) -> Result<Project, EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::Validation(
                "project name must be non-empty".into(),
            ));
        }
        self.store()
            .with_write(|txn| ProjectRepo::create(txn, name, local_path, origin_url, description))
    }

    /// Replace the project description.
    pub fn update_project_description(
        &self,
        project_id: i64,
        description: Option<&str>,
    ) -> Result<Project, EngineError> {
        self.store()
            .with_write(|txn| ProjectRepo::update_description(txn, project_id, description))
    }
}

impl QueryEngine {
    /// Fetch a project, erroring when absent.
    pub fn get_project(&self, project_id: i64) -> Result<Project, EngineError> {
        let conn = self.store().reader()?;
        ProjectRepo::get(&conn, project_id)?
            .ok_or_else(|| EngineError::project_not_found(project_id))
    }

    /// All projects, by name.
    pub fn list_projects(&self) -> Result<Vec<Project>, EngineError> {
        let conn = self.store().reader()?;
        ProjectRepo::list(&conn)
    }
}
