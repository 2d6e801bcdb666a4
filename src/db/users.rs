//! User account operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::{is_unique_violation, lookup_err, DbOp, TripError};

/// Input for registering a user
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserInput {
    pub login: String,
    pub password: String,
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// Stored credentials, used only for the login check
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user_id: i64,
    pub password: String,
}

/// Public user profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: i64,
    pub login: String,
    pub properties: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Create a user, returning its id
pub fn create_user(conn: &Connection, input: &CreateUserInput) -> Result<i64, TripError> {
    let properties = serde_json::to_string(&input.properties)
        .map_err(|_| TripError::BadInput("user properties are not serializable".into()))?;

    conn.execute(
        "INSERT INTO users (login, password, properties, created_at) VALUES (?, ?, ?, ?)",
        params![input.login, input.password, properties, Utc::now()],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            TripError::Conflict(format!("login {} is taken", input.login))
        } else {
            TripError::db(DbOp::Exec, e)
        }
    })?;

    Ok(conn.last_insert_rowid())
}

/// Look up credentials by login
pub fn get_credentials(conn: &Connection, login: &str) -> Result<Credentials, TripError> {
    conn.query_row(
        "SELECT id, password FROM users WHERE login = ?",
        params![login],
        |row| {
            Ok(Credentials {
                user_id: row.get(0)?,
                password: row.get(1)?,
            })
        },
    )
    .map_err(lookup_err(DbOp::Scan, format!("login {}", login)))
}

/// Get the public profile of a user
pub fn get_profile(conn: &Connection, user_id: i64) -> Result<UserProfile, TripError> {
    let (login, properties, created_at): (String, String, DateTime<Utc>) = conn
        .query_row(
            "SELECT login, properties, created_at FROM users WHERE id = ?",
            params![user_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .map_err(lookup_err(DbOp::Scan, format!("user {}", user_id)))?;

    Ok(UserProfile {
        id: user_id,
        login,
        properties: serde_json::from_str(&properties).unwrap_or(serde_json::Value::Null),
        created_at,
    })
}

/// Replace the free-form properties of a user
pub fn update_properties(
    conn: &Connection,
    user_id: i64,
    properties: &serde_json::Value,
) -> Result<(), TripError> {
    let properties = serde_json::to_string(properties)
        .map_err(|_| TripError::BadInput("user properties are not serializable".into()))?;

    let changed = conn
        .execute(
            "UPDATE users SET properties = ? WHERE id = ?",
            params![properties, user_id],
        )
        .map_err(|e| TripError::db(DbOp::Exec, e))?;

    if changed == 0 {
        return Err(TripError::NotFound(format!("user {}", user_id)));
    }
    Ok(())
}

pub fn user_exists(conn: &Connection, user_id: i64) -> Result<bool, TripError> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)",
        params![user_id],
        |row| row.get(0),
    )
    .map_err(|e| TripError::db(DbOp::Query, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TripDb;

    fn input(login: &str) -> CreateUserInput {
        CreateUserInput {
            login: login.into(),
            password: "secret".into(),
            properties: serde_json::json!({"city": "Moscow"}),
        }
    }

    #[test]
    fn test_duplicate_login_is_conflict() {
        let db = TripDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            create_user(conn, &input("ivan"))?;
            let err = create_user(conn, &input("ivan")).unwrap_err();
            assert!(matches!(err, TripError::Conflict(_)));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_profile_and_properties() {
        let db = TripDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let id = create_user(conn, &input("olga"))?;
            assert_eq!(get_credentials(conn, "olga")?.user_id, id);
            assert_eq!(get_profile(conn, id)?.properties["city"], "Moscow");

            update_properties(conn, id, &serde_json::json!({"city": "Kazan"}))?;
            assert_eq!(get_profile(conn, id)?.properties["city"], "Kazan");
            assert!(user_exists(conn, id)?);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_unknown_user() {
        let db = TripDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            assert!(matches!(get_credentials(conn, "nobody"), Err(TripError::NotFound(_))));
            assert!(matches!(
                update_properties(conn, 42, &serde_json::Value::Null),
                Err(TripError::NotFound(_))
            ));
            assert!(!user_exists(conn, 42)?);
            Ok(())
        })
        .unwrap();
    }
}
