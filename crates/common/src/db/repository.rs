//! Repository pattern for database operations
//!
//! Every course and document lookup that serves a request is scoped by
//! the owning user id, so a caller can never reach another user's rows.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use serde::Serialize;
use uuid::Uuid;

/// A course together with its documents, newest first
#[derive(Debug, Clone, Serialize)]
pub struct CourseWithDocuments {
    #[serde(flatten)]
    pub course: Course,
    pub documents: Vec<Document>,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.conn()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // User Operations
    // ========================================================================

    /// Insert a user; a taken email yields `Duplicate`
    pub async fn create_user(
        &self,
        email: &str,
        name: &str,
        hashed_password: Option<String>,
    ) -> Result<User> {
        let now = chrono::Utc::now();

        let user = UserActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_string()),
            name: Set(name.to_string()),
            hashed_password: Set(hashed_password),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        user.insert(self.conn()).await.map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => AppError::Duplicate {
                message: "User with this email already exists".to_string(),
            },
            _ => AppError::Database(e),
        })
    }

    /// Find user by email
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        UserEntity::find()
            .filter(UserColumn::Email.eq(email))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Find user by ID
    pub async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        UserEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Course Operations
    // ========================================================================

    /// Create a course owned by `user_id`
    pub async fn create_course(
        &self,
        user_id: Uuid,
        title: &str,
        description: Option<String>,
    ) -> Result<Course> {
        let now = chrono::Utc::now();

        let course = CourseActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(title.to_string()),
            description: Set(description),
            user_id: Set(user_id),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        course.insert(self.conn()).await.map_err(Into::into)
    }

    /// All courses of a user, newest first
    pub async fn list_courses_for_user(&self, user_id: Uuid) -> Result<Vec<Course>> {
        CourseEntity::find()
            .filter(CourseColumn::UserId.eq(user_id))
            .order_by_desc(CourseColumn::CreatedAt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Find a course only if `user_id` owns it
    pub async fn find_course_for_user(
        &self,
        course_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Course>> {
        CourseEntity::find_by_id(course_id)
            .filter(CourseColumn::UserId.eq(user_id))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Course detail with its documents; `CourseNotFound` when absent or not owned
    pub async fn get_course_with_documents(
        &self,
        course_id: Uuid,
        user_id: Uuid,
    ) -> Result<CourseWithDocuments> {
        let course = self
            .find_course_for_user(course_id, user_id)
            .await?
            .ok_or_else(|| AppError::CourseNotFound {
                id: course_id.to_string(),
            })?;

        let documents = self.list_documents_for_course(course.id).await?;

        Ok(CourseWithDocuments { course, documents })
    }

    // ========================================================================
    // Document Operations
    // ========================================================================

    /// Documents of a course, newest first
    pub async fn list_documents_for_course(&self, course_id: Uuid) -> Result<Vec<Document>> {
        DocumentEntity::find()
            .filter(DocumentColumn::CourseId.eq(course_id))
            .order_by_desc(DocumentColumn::CreatedAt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Record a new upload before the blob is stored
    pub async fn create_document(
        &self,
        course_id: Uuid,
        name: &str,
        file_type: &str,
    ) -> Result<Document> {
        let now = chrono::Utc::now();

        let document = DocumentActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            file_type: Set(file_type.to_string()),
            url: Set(String::new()),
            status: Set(DocumentStatus::Uploading.into()),
            course_id: Set(course_id),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        document.insert(self.conn()).await.map_err(Into::into)
    }

    /// Find document by ID
    pub async fn find_document_by_id(&self, id: Uuid) -> Result<Option<Document>> {
        DocumentEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Set the blob URL and move the document to `PENDING_PROCESSING`
    pub async fn mark_document_stored(&self, id: Uuid, url: &str) -> Result<Document> {
        let mut document = self.load_document(id).await?;
        document.url = Set(url.to_string());
        document.status = Set(DocumentStatus::PendingProcessing.into());
        document.updated_at = Set(chrono::Utc::now().into());

        document.update(self.conn()).await.map_err(Into::into)
    }

    /// Update document status
    pub async fn update_document_status(
        &self,
        id: Uuid,
        status: DocumentStatus,
    ) -> Result<Document> {
        let mut document = self.load_document(id).await?;
        document.status = Set(status.into());
        document.updated_at = Set(chrono::Utc::now().into());

        document.update(self.conn()).await.map_err(Into::into)
    }

    async fn load_document(&self, id: Uuid) -> Result<DocumentActiveModel> {
        let document = DocumentEntity::find_by_id(id)
            .one(self.conn())
            .await?
            .ok_or_else(|| AppError::DocumentNotFound { id: id.to_string() })?;

        Ok(document.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    async fn repo() -> Repository {
        Repository::new(DbPool::in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let repo = repo().await;
        assert_ok!(
            repo.create_user("ada@example.com", "Ada", Some("hash".into()))
                .await
        );

        let err = assert_err!(repo.create_user("ada@example.com", "Ada Again", None).await);
        assert!(matches!(err, AppError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn test_course_lookup_is_owner_scoped() {
        let repo = repo().await;
        let owner = repo.create_user("a@example.com", "A", None).await.unwrap();
        let other = repo.create_user("b@example.com", "B", None).await.unwrap();

        let course = repo
            .create_course(owner.id, "Linear Algebra", None)
            .await
            .unwrap();

        assert!(repo
            .find_course_for_user(course.id, owner.id)
            .await
            .unwrap()
            .is_some());
        assert!(repo
            .find_course_for_user(course.id, other.id)
            .await
            .unwrap()
            .is_none());
        assert!(repo.list_courses_for_user(other.id).await.unwrap().is_empty());

        let err = repo
            .get_course_with_documents(course.id, other.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CourseNotFound { .. }));
    }

    #[tokio::test]
    async fn test_document_status_lifecycle() {
        let repo = repo().await;
        let user = repo.create_user("c@example.com", "C", None).await.unwrap();
        let course = repo.create_course(user.id, "Biology", None).await.unwrap();

        let doc = repo
            .create_document(course.id, "cells.pdf", "PDF")
            .await
            .unwrap();
        assert_eq!(doc.document_status(), Some(DocumentStatus::Uploading));
        assert!(doc.url.is_empty());

        let doc = repo
            .mark_document_stored(doc.id, "https://blob.test/cells.pdf")
            .await
            .unwrap();
        assert_eq!(doc.document_status(), Some(DocumentStatus::PendingProcessing));
        assert_eq!(doc.url, "https://blob.test/cells.pdf");

        let doc = repo
            .update_document_status(doc.id, DocumentStatus::Completed)
            .await
            .unwrap();
        assert_eq!(doc.document_status(), Some(DocumentStatus::Completed));

        let detail = repo
            .get_course_with_documents(course.id, user.id)
            .await
            .unwrap();
        assert_eq!(detail.documents.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_document_update_is_not_found() {
        let repo = repo().await;
        let err = repo
            .update_document_status(Uuid::new_v4(), DocumentStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DocumentNotFound { .. }));
    }
}
