/// # Test Utilities Module
///
/// Testing infrastructure shared by the unit and in-crate integration tests:
/// - Isolated in-memory database fixtures behind a `ConnectionManager`
/// - Sample schema and data
/// - `DbalError` assertion helpers

use crate::config::Credentials;
use crate::core::db::connection::ConnectionManager;
use crate::core::db::value::Params;
use crate::core::Result;

/// Isolated database test fixture
pub struct DatabaseFixture {
    pub name: String,
    pub connection: ConnectionManager,
}

impl DatabaseFixture {
    /// Create a fixture over a fresh in-memory database with query logging enabled
    pub fn new(name: &str) -> Result<Self> {
        let mut credentials = Credentials::default();
        credentials.query_logs = true;
        let mut connection = ConnectionManager::new(credentials);
        connection.set_dsn("sqlite::memory:")?;

        Ok(DatabaseFixture {
            name: name.to_string(),
            connection,
        })
    }

    /// Create fixture with sample data schema
    pub fn with_sample_data(name: &str) -> Result<Self> {
        let mut fixture = Self::new(name)?;

        fixture.setup_standard_schema()?;
        fixture.populate_sample_data()?;

        Ok(fixture)
    }

    /// Set up standard test schema
    pub fn setup_standard_schema(&mut self) -> Result<()> {
        self.connection.exec(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                active BOOLEAN DEFAULT TRUE,
                score REAL
            )",
        )?;
        self.connection.exec(
            "CREATE TABLE posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                published BOOLEAN DEFAULT FALSE,
                FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
            )",
        )?;
        Ok(())
    }

    /// Populate with sample data through parameter binding
    pub fn populate_sample_data(&mut self) -> Result<()> {
        let users = [
            ("alice", "alice@example.com", 8.5),
            ("bob", "bob@example.com", 6.0),
            ("charlie", "charlie@example.com", 9.25),
        ];
        for (username, email, score) in users {
            let params = Params::new()
                .with("username", username)
                .with("email", email)
                .with("score", score);
            self.connection.query(
                "INSERT INTO users (username, email, score) VALUES (:username, :email, :score)",
                Some(&params),
                None,
            )?;
        }

        let posts = [
            (1, "Welcome to Rust", true),
            (2, "My Trip to Paris", false),
            (1, "Prepared Statements", true),
        ];
        for (user_id, title, published) in posts {
            let params = Params::new()
                .with("user_id", user_id)
                .with("title", title)
                .with("published", published);
            self.connection.query(
                "INSERT INTO posts (user_id, title, published) VALUES (:user_id, :title, :published)",
                Some(&params),
                None,
            )?;
        }

        Ok(())
    }
}

/// Error testing utilities specific to DbalError patterns
pub mod error_testing {
    /// Verify error message quality (contains helpful information)
    pub fn verify_error_message_quality<T, E>(result: &std::result::Result<T, E>, context: &str)
    where
        T: std::fmt::Debug,
        E: std::fmt::Display,
    {
        if let Err(ref error) = result {
            let error_str = error.to_string();

            assert!(!error_str.is_empty(), "Error message should not be empty in {}", context);
            assert!(error_str.len() > 10, "Error message should be descriptive in {}", context);
        } else {
            panic!("Expected error but got Ok: {}", context);
        }
    }
}

/// Asserts that a result is an error of the given `DbalError` variant
macro_rules! assert_dbal_error {
    ($result:expr, $variant:pat, $context:expr) => {
        match $result {
            Err($variant) => {}
            Ok(_) => panic!("Expected {} but got Ok in {}", stringify!($variant), $context),
            Err(other) => panic!("Expected {} but got {:?} in {}", stringify!($variant), other, $context),
        }
    };
}

pub(crate) use assert_dbal_error;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DbalError;

    #[test]
    fn test_database_fixture_creation() {
        let fixture = DatabaseFixture::new("test_create").unwrap();
        assert_eq!(fixture.name, "test_create");
        assert!(!fixture.connection.is_connected());
    }

    #[test]
    fn test_sample_data_fixture() {
        let mut fixture = DatabaseFixture::with_sample_data("test_sample").unwrap();

        let mut cursor = fixture
            .connection
            .query("SELECT COUNT(*) AS n FROM users", None, None)
            .unwrap();
        let row = cursor.row().unwrap().unwrap();
        assert_eq!(row.get("n"), Some(&crate::core::db::value::Value::Integer(3)));
        assert_eq!(fixture.connection.query_logs().len(), 7);
    }

    #[test]
    fn test_error_assertion_macro() {
        let result: Result<i32> = Err(DbalError::CursorUnavailable);
        assert_dbal_error!(result, DbalError::CursorUnavailable, "macro test");
    }
}
