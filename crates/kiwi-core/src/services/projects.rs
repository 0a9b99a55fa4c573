//! Projects and saved keywords
//!
//! Every query is scoped to the owning user; another user's rows behave as
//! if they did not exist.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{CreateKeyword, CreateProject, Keyword, Project, KEYWORD_PLATFORMS};

const DEFAULT_PROJECT_COLOR: &str = "#22c55e";

#[derive(Clone)]
pub struct ProjectStore {
    pool: SqlitePool,
}

impl ProjectStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Projects owned by a user, newest first
    pub async fn list_projects(&self, user_id: &str, include_archived: bool) -> Result<Vec<Project>> {
        let projects = sqlx::query_as::<_, Project>(
            r#"
            SELECT * FROM projects
            WHERE user_id = ? AND (? OR is_archived = 0)
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(include_archived)
        .fetch_all(&self.pool)
        .await?;
        Ok(projects)
    }

    pub async fn create_project(&self, user_id: &str, req: CreateProject) -> Result<Project> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(Error::validation("Project name is required"));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let color = req
            .color
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROJECT_COLOR.to_string());

        sqlx::query(
            r#"
            INSERT INTO projects (id, user_id, name, description, color, is_archived, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(name)
        .bind(&req.description)
        .bind(&color)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_project(user_id, &id).await
    }

    pub async fn get_project(&self, user_id: &str, project_id: &str) -> Result<Project> {
        sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ? AND user_id = ?")
            .bind(project_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Project not found"))
    }

    /// Flip a project's archived flag
    pub async fn set_archived(&self, user_id: &str, project_id: &str, archived: bool) -> Result<Project> {
        let result = sqlx::query(
            "UPDATE projects SET is_archived = ?, updated_at = ? WHERE id = ? AND user_id = ?",
        )
        .bind(archived)
        .bind(Utc::now())
        .bind(project_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Project not found"));
        }
        self.get_project(user_id, project_id).await
    }

    pub async fn list_keywords(&self, user_id: &str, project_id: &str) -> Result<Vec<Keyword>> {
        // Ownership check first so a foreign project reads as missing
        self.get_project(user_id, project_id).await?;

        let keywords = sqlx::query_as::<_, Keyword>(
            "SELECT * FROM keywords WHERE project_id = ? AND user_id = ? ORDER BY created_at DESC",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(keywords)
    }

    pub async fn add_keyword(&self, user_id: &str, project_id: &str, req: CreateKeyword) -> Result<Keyword> {
        let keyword = req.keyword.trim();
        if keyword.is_empty() {
            return Err(Error::validation("Keyword is required"));
        }
        if let Some(platform) = req.platform.as_deref() {
            if !KEYWORD_PLATFORMS.contains(&platform) {
                return Err(Error::validation(format!("Unknown platform: {}", platform)));
            }
        }

        self.get_project(user_id, project_id).await?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO keywords (id, user_id, project_id, keyword, search_volume, competition, cpc, platform, notes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(project_id)
        .bind(keyword)
        .bind(req.search_volume)
        .bind(&req.competition)
        .bind(req.cpc)
        .bind(&req.platform)
        .bind(&req.notes)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let saved = sqlx::query_as::<_, Keyword>("SELECT * FROM keywords WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.pool)
            .await?;
        Ok(saved)
    }

    pub async fn delete_keyword(&self, user_id: &str, keyword_id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM keywords WHERE id = ? AND user_id = ?")
            .bind(keyword_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Keyword not found"));
        }
        Ok(())
    }
}
