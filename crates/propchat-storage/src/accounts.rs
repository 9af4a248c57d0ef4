//! Local email/password accounts.
//!
//! Passwords are stored as PBKDF2-SHA256 hashes. Session and confirmation
//! tokens are random 32-byte values handed to the client hex-encoded; only
//! their SHA-256 digest is persisted.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use rusqlite::OptionalExtension;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use uuid::Uuid;

use propchat_core::config::AuthConfig;
use propchat_core::error::PropChatError;
use propchat_core::services::AuthProvider;
use propchat_core::types::{Session, User};

use crate::db::Database;

const HASH_SCHEME: &str = "pbkdf2-sha256";
const SALT_LENGTH: usize = 16;
const HASH_LENGTH: usize = 32;
const TOKEN_LENGTH: usize = 32;
const CONFIRMATION_TTL_HOURS: i64 = 24;

const INVALID_CREDENTIALS: &str = "Invalid login credentials";
const EMAIL_NOT_CONFIRMED: &str = "Email not confirmed";
const ALREADY_REGISTERED: &str = "User already registered";
const INVALID_EMAIL: &str = "Unable to validate email address: invalid format";
const INVALID_LINK: &str = "Email link is invalid or has expired";

/// Account store backed by the shared SQLite database.
#[derive(Clone)]
pub struct LocalAuthProvider {
    db: Arc<Database>,
    config: AuthConfig,
}

impl LocalAuthProvider {
    pub fn new(db: Arc<Database>, config: AuthConfig) -> Self {
        Self { db, config }
    }

    /// Register a user. Returns the user and the raw confirmation token.
    ///
    /// When email confirmation is disabled the account is confirmed
    /// immediately and no token is issued.
    pub fn register(&self, email: &str, password: &str) -> Result<(User, Option<String>), PropChatError> {
        let email = normalize_email(email)?;
        let min = self.config.min_password_length;
        if password.chars().count() < min {
            return Err(PropChatError::Auth(format!(
                "Password should be at least {} characters.",
                min
            )));
        }

        let user = User {
            id: Uuid::new_v4(),
            email,
            email_confirmed: !self.config.require_email_confirmation,
            created_at: Utc::now(),
        };
        let password_hash = hash_password(password, self.config.password_hash_iterations);
        let confirmation = if user.email_confirmed {
            None
        } else {
            Some(generate_token())
        };
        let expires_at = user.created_at + Duration::hours(CONFIRMATION_TTL_HOURS);

        self.db.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| PropChatError::Storage(e.to_string()))?;

            let exists: bool = tx
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
                    [&user.email],
                    |row| row.get(0),
                )
                .map_err(|e| PropChatError::Storage(e.to_string()))?;
            if exists {
                return Err(PropChatError::Auth(ALREADY_REGISTERED.to_string()));
            }

            tx.execute(
                "INSERT INTO users (id, email, password_hash, email_confirmed, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    user.id.to_string(),
                    user.email,
                    password_hash,
                    user.email_confirmed,
                    user.created_at.timestamp_millis(),
                ],
            )
            .map_err(|e| PropChatError::Storage(format!("Failed to create user: {}", e)))?;

            if let Some(token) = &confirmation {
                tx.execute(
                    "INSERT INTO email_confirmations (token_hash, user_id, expires_at)
                     VALUES (?1, ?2, ?3)",
                    rusqlite::params![
                        hash_token(token),
                        user.id.to_string(),
                        expires_at.timestamp_millis()
                    ],
                )
                .map_err(|e| PropChatError::Storage(e.to_string()))?;
            }

            tx.commit()
                .map_err(|e| PropChatError::Storage(e.to_string()))
        })?;

        info!(user_id = %user.id, "User registered");
        Ok((user, confirmation))
    }

    /// Check credentials and open a session.
    pub fn login(&self, email: &str, password: &str) -> Result<Session, PropChatError> {
        let email = email.trim().to_lowercase();
        let found = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, email, email_confirmed, created_at, password_hash
                 FROM users WHERE email = ?1",
                [&email],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| PropChatError::Storage(e.to_string()))
        })?;

        let Some((id, email, confirmed, created_at, password_hash)) = found else {
            debug!("Login attempt for unknown email");
            return Err(PropChatError::Auth(INVALID_CREDENTIALS.to_string()));
        };
        if !verify_password(password, &password_hash) {
            debug!(user_id = %id, "Login attempt with wrong password");
            return Err(PropChatError::Auth(INVALID_CREDENTIALS.to_string()));
        }
        if !confirmed {
            return Err(PropChatError::Auth(EMAIL_NOT_CONFIRMED.to_string()));
        }

        let user = User {
            id: parse_uuid(&id)?,
            email,
            email_confirmed: confirmed,
            created_at: from_millis(created_at),
        };
        self.open_session(user)
    }

    /// Redeem a confirmation token: mark the email confirmed and open a session.
    pub fn redeem_confirmation(&self, token: &str) -> Result<Session, PropChatError> {
        let token_hash = hash_token(token);
        let now = Utc::now().timestamp_millis();

        let user_id = self.db.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| PropChatError::Storage(e.to_string()))?;

            let row: Option<(String, i64)> = tx
                .query_row(
                    "SELECT user_id, expires_at FROM email_confirmations WHERE token_hash = ?1",
                    [&token_hash],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(|e| PropChatError::Storage(e.to_string()))?;

            // Tokens are single-use whether or not they are still valid.
            tx.execute(
                "DELETE FROM email_confirmations WHERE token_hash = ?1",
                [&token_hash],
            )
            .map_err(|e| PropChatError::Storage(e.to_string()))?;

            let user_id = match row {
                Some((user_id, expires_at)) if expires_at > now => user_id,
                _ => {
                    tx.commit()
                        .map_err(|e| PropChatError::Storage(e.to_string()))?;
                    return Err(PropChatError::Auth(INVALID_LINK.to_string()));
                }
            };

            tx.execute(
                "UPDATE users SET email_confirmed = 1 WHERE id = ?1",
                [&user_id],
            )
            .map_err(|e| PropChatError::Storage(e.to_string()))?;
            tx.commit()
                .map_err(|e| PropChatError::Storage(e.to_string()))?;
            Ok(user_id)
        })?;

        let user = self
            .find_user(&user_id)?
            .ok_or_else(|| PropChatError::Auth(INVALID_LINK.to_string()))?;
        info!(user_id = %user.id, "Email confirmed");
        self.open_session(user)
    }

    /// The user behind a session token, if the session is live.
    pub fn session_user(&self, token: &str) -> Result<Option<User>, PropChatError> {
        let now = Utc::now().timestamp_millis();
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT u.id, u.email, u.email_confirmed, u.created_at
                     FROM sessions s JOIN users u ON u.id = s.user_id
                     WHERE s.token_hash = ?1 AND s.expires_at > ?2",
                    rusqlite::params![hash_token(token), now],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, bool>(2)?,
                            row.get::<_, i64>(3)?,
                        ))
                    },
                )
                .optional()
                .map_err(|e| PropChatError::Storage(e.to_string()))?;

            row.map(|(id, email, email_confirmed, created_at)| {
                Ok(User {
                    id: parse_uuid(&id)?,
                    email,
                    email_confirmed,
                    created_at: from_millis(created_at),
                })
            })
            .transpose()
        })
    }

    /// Delete a session. Unknown tokens are ignored.
    pub fn revoke(&self, token: &str) -> Result<(), PropChatError> {
        let removed = self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM sessions WHERE token_hash = ?1",
                [hash_token(token)],
            )
            .map_err(|e| PropChatError::Storage(e.to_string()))
        })?;
        debug!(removed, "Session revoked");
        Ok(())
    }

    /// Delete expired sessions and confirmation tokens. Returns rows removed.
    pub fn purge_expired(&self) -> Result<usize, PropChatError> {
        let now = Utc::now().timestamp_millis();
        self.db.with_conn(|conn| {
            let sessions = conn
                .execute("DELETE FROM sessions WHERE expires_at <= ?1", [now])
                .map_err(|e| PropChatError::Storage(e.to_string()))?;
            let confirmations = conn
                .execute("DELETE FROM email_confirmations WHERE expires_at <= ?1", [now])
                .map_err(|e| PropChatError::Storage(e.to_string()))?;
            Ok(sessions + confirmations)
        })
    }

    /// Run a PBKDF2-bound call on the blocking pool.
    async fn off_runtime<T, F>(&self, f: F) -> Result<T, PropChatError>
    where
        F: FnOnce(LocalAuthProvider) -> Result<T, PropChatError> + Send + 'static,
        T: Send + 'static,
    {
        let provider = self.clone();
        tokio::task::spawn_blocking(move || f(provider))
            .await
            .map_err(|e| PropChatError::Storage(format!("Password hashing task panicked: {}", e)))?
    }

    fn open_session(&self, user: User) -> Result<Session, PropChatError> {
        let token = generate_token();
        let created_at = Utc::now();
        let expires_at = created_at + Duration::hours(self.config.session_ttl_hours as i64);

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (token_hash, user_id, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    hash_token(&token),
                    user.id.to_string(),
                    expires_at.timestamp_millis(),
                    created_at.timestamp_millis(),
                ],
            )
            .map_err(|e| PropChatError::Storage(format!("Failed to create session: {}", e)))?;
            Ok(())
        })?;

        Ok(Session {
            access_token: token,
            user,
            expires_at,
        })
    }

    fn find_user(&self, id: &str) -> Result<Option<User>, PropChatError> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT email, email_confirmed, created_at FROM users WHERE id = ?1",
                    [id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, bool>(1)?,
                            row.get::<_, i64>(2)?,
                        ))
                    },
                )
                .optional()
                .map_err(|e| PropChatError::Storage(e.to_string()))?;

            row.map(|(email, email_confirmed, created_at)| {
                Ok(User {
                    id: parse_uuid(id)?,
                    email,
                    email_confirmed,
                    created_at: from_millis(created_at),
                })
            })
            .transpose()
        })
    }
}

#[async_trait]
impl AuthProvider for LocalAuthProvider {
    async fn get_user(&self, access_token: &str) -> Result<Option<User>, PropChatError> {
        self.session_user(access_token)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, PropChatError> {
        let (email, password) = (email.to_string(), password.to_string());
        self.off_runtime(move |provider| provider.login(&email, &password))
            .await
    }

    async fn sign_up(&self, email: &str, password: &str, redirect_to: &str) -> Result<User, PropChatError> {
        let (email, password) = (email.to_string(), password.to_string());
        let (user, token) = self
            .off_runtime(move |provider| provider.register(&email, &password))
            .await?;
        if let Some(token) = token {
            // No mail transport: the link goes to the operator log.
            let separator = if redirect_to.contains('?') { '&' } else { '?' };
            info!(
                email = %user.email,
                link = %format!("{}{}token={}", redirect_to, separator, token),
                "Email confirmation link issued"
            );
        }
        Ok(user)
    }

    async fn confirm(&self, token: &str) -> Result<Session, PropChatError> {
        self.redeem_confirmation(token)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), PropChatError> {
        self.revoke(access_token)
    }
}

// =============================================================================
// Hashing helpers
// =============================================================================

fn normalize_email(email: &str) -> Result<String, PropChatError> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(PropChatError::Auth(INVALID_EMAIL.to_string()))
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_LENGTH];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// `pbkdf2-sha256$<iterations>$<salt hex>$<hash hex>`
fn hash_password(password: &str, iterations: u32) -> String {
    let mut salt = [0u8; SALT_LENGTH];
    rand::rng().fill_bytes(&mut salt);
    let mut hash = [0u8; HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut hash);
    format!(
        "{}${}${}${}",
        HASH_SCHEME,
        iterations,
        hex::encode(salt),
        hex::encode(hash)
    )
}

fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        warn!("Malformed password hash in users table");
        return false;
    };
    if scheme != HASH_SCHEME {
        warn!(scheme, "Unsupported password hash scheme");
        return false;
    }
    let (Ok(iterations), Ok(salt), Ok(expected)) =
        (iterations.parse::<u32>(), hex::decode(salt), hex::decode(expected))
    else {
        warn!("Malformed password hash in users table");
        return false;
    };

    let mut actual = vec![0u8; expected.len()];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut actual);
    actual.ct_eq(&expected).into()
}

fn parse_uuid(id: &str) -> Result<Uuid, PropChatError> {
    Uuid::parse_str(id).map_err(|e| PropChatError::Storage(format!("Invalid user id: {}", e)))
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(Utc::now)
}
