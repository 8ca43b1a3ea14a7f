//! Project rows. Immutable after create except `description`.

use rusqlite::{params, Connection, OptionalExtension};

use foreman_core::time::now_iso;
use foreman_core::types::Project;
use foreman_core::EngineError;

use crate::rows::project_from_row;

use super::map_constraint;

/// Project repository.
pub struct ProjectRepo;

impl ProjectRepo {
    /// Create a project. Duplicate names surface as `Conflict`.
    pub fn create(
        conn: &Connection,
        name: &str,
        local_path: Option<&str>,
        origin_url: Option<&str>,
        description: Option<&str>,
    ) -> Result<Project, EngineError> {
        let now = now_iso();
        conn.execute(
            "INSERT INTO projects (name, local_path, origin_url, description, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![name, local_path, origin_url, description, now],
        )
        .map_err(|e| map_constraint(e, format!("project '{name}' already exists")))?;
        let id = conn.last_insert_rowid();
        Self::get(conn, id)?.ok_or_else(|| EngineError::project_not_found(id))
    }

    pub fn get(conn: &Connection, id: i64) -> Result<Option<Project>, EngineError> {
        let project = conn
            .query_row(
                "SELECT * FROM projects WHERE id = ?1",
                params![id],
                project_from_row,
            )
            .optional()?;
        Ok(project)
    }

    pub fn get_by_name(conn: &Connection, name: &str) -> Result<Option<Project>, EngineError> {
        let project = conn
            .query_row(
                "SELECT * FROM projects WHERE name = ?1",
                params![name],
                project_from_row,
            )
            .optional()?;
        Ok(project)
    }

    pub fn list(conn: &Connection) -> Result<Vec<Project>, EngineError> {
        let mut stmt = conn.prepare("SELECT * FROM projects ORDER BY name")?;
        let rows = stmt.query_map([], project_from_row)?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row?);
        }
        Ok(projects)
    }

    /// Update the description, the only mutable field.
    pub fn update_description(
        conn: &Connection,
        id: i64,
        description: Option<&str>,
    ) -> Result<Project, EngineError> {
        let changed = conn.execute(
            "UPDATE projects SET description = ?1, updated_at = ?2 WHERE id = ?3",
            params![description, now_iso(), id],
        )?;
        if changed == 0 {
            return Err(EngineError::project_not_found(id));
        }
        Self::get(conn, id)?.ok_or_else(|| EngineError::project_not_found(id))
    }
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::repository::test_support::setup_db;

    #[test]
    fn create_and_get() {
        let conn = setup_db();
        let project = ProjectRepo::create(
            &conn,
            "api",
            Some("/srv/api"),
            Some("https://github.com/acme/api"),
            Some("The API service"),
        )
        .unwrap();
        assert_eq!(project.name, "api");

        let by_name = ProjectRepo::get_by_name(&conn, "api").unwrap().unwrap();
        assert_eq!(by_name.id, project.id);
    }

    #[test]
    fn duplicate_name_is_conflict() {
        let conn = setup_db();
        ProjectRepo::create(&conn, "api", None, None, None).unwrap();
        let err = ProjectRepo::create(&conn, "api", None, None, None).unwrap_err();
        assert_eq!(err.kind(), "CONFLICT");
    }

    #[test]
    fn update_description_only() {
        let conn = setup_db();
        let project = ProjectRepo::create(&conn, "api", Some("/srv/api"), None, None).unwrap();
        let updated =
            ProjectRepo::update_description(&conn, project.id, Some("fresh words")).unwrap();
        assert_eq!(updated.description.as_deref(), Some("fresh words"));
        assert_eq!(updated.local_path.as_deref(), Some("/srv/api"));
    }

    #[test]
    fn update_missing_is_not_found() {
        let conn = setup_db();
        let err = ProjectRepo::update_description(&conn, 9, None).unwrap_err();
        assert_eq!(err.kind(), "NOT_FOUND");
    }

    #[test]
    fn list_sorted_by_name() {
        let conn = setup_db();
        ProjectRepo::create(&conn, "web", None, None, None).unwrap();
        ProjectRepo::create(&conn, "api", None, None, None).unwrap();
        let names: Vec<String> = ProjectRepo::list(&conn)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["api", "web"]);
    }
}
