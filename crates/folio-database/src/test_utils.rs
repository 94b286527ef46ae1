//! Test utilities for database integration tests
//!
//! Every `TestDatabase` is a private in-memory SQLite database with all
//! migrations applied, so tests never share state and need no running server.

use crate::{establish_connection, DbConnection};
use sea_orm::*;
use std::sync::Arc;

/// Tables owned by the application, in deletion order
const APPLICATION_TABLES: &[&str] = &["request_logs", "ip_metadata"];

/// Test database setup with an in-memory SQLite database
pub struct TestDatabase {
    pub db: Arc<DbConnection>,
    pub database_url: String,
}

impl TestDatabase {
    /// Create a new migrated test database
    pub async fn new() -> anyhow::Result<Self> {
        let database_url = "sqlite::memory:".to_string();
        let db = establish_connection(&database_url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create test database: {}", e))?;

        let test_db = TestDatabase { db, database_url };

        // Verify connection works
        test_db
            .test_connection()
            .await
            .map_err(|e| anyhow::anyhow!("Initial connection test failed: {}", e))?;

        Ok(test_db)
    }

    /// Execute raw SQL (useful for test setup)
    pub async fn execute_sql(&self, sql: &str) -> anyhow::Result<ExecResult> {
        let statement = Statement::from_string(self.db.get_database_backend(), sql.to_owned());
        let result = self.db.execute(statement).await?;
        Ok(result)
    }

    /// Query raw SQL and return results
    pub async fn query_sql(&self, sql: &str) -> anyhow::Result<Vec<QueryResult>> {
        let statement = Statement::from_string(self.db.get_database_backend(), sql.to_owned());
        let result = self.db.query_all(statement).await?;
        Ok(result)
    }

    /// Delete all rows from application tables
    pub async fn cleanup_all_tables(&self) -> anyhow::Result<()> {
        for table in APPLICATION_TABLES {
            self.execute_sql(&format!("DELETE FROM {}", table)).await?;
        }
        Ok(())
    }

    /// Test database connectivity
    pub async fn test_connection(&self) -> anyhow::Result<()> {
        let statement =
            Statement::from_string(self.db.get_database_backend(), "SELECT 1".to_owned());
        let result = self.db.query_one(statement).await?;

        if result.is_none() {
            return Err(anyhow::anyhow!("Connection test failed"));
        }

        Ok(())
    }

    /// Get the database connection
    pub fn connection(&self) -> &DbConnection {
        &self.db
    }

    /// Get the database connection as Arc
    pub fn connection_arc(&self) -> Arc<DbConnection> {
        Arc::clone(&self.db)
    }
}
