use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{query, query_as, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::{ChatStore, GrievanceStore, StoreError, StoreResult, UserStore};
use crate::models::{Chat, Grievance, GrievanceStatus, Message, Role, User};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

/// Maps unique-constraint violations to `Conflict`, everything else to `Database`.
fn map_write_error(e: sqlx::Error, what: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(format!("{} already exists", what))
        }
        _ => StoreError::Database(e),
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: &User) -> StoreResult<User> {
        let user = query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, email, password_hash, google_id, avatar, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.google_id)
        .bind(&user.avatar)
        .bind(user.role)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "User"))?;

        debug!("User created: {}", user.id);
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_google_id(&self, google_id: &str) -> StoreResult<Option<User>> {
        Ok(query_as::<_, User>("SELECT * FROM users WHERE google_id = $1")
            .bind(google_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_user(&self, user: &User) -> StoreResult<User> {
        query_as::<_, User>(
            r#"
            UPDATE users
            SET name = $1, email = $2, password_hash = $3, google_id = $4, avatar = $5, role = $6, updated_at = $7
            WHERE id = $8
            RETURNING *
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.google_id)
        .bind(&user.avatar)
        .bind(user.role)
        .bind(Utc::now())
        .bind(user.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "Email"))?
        .ok_or(StoreError::NotFound)
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<()> {
        // chats, messages and grievances go with it via ON DELETE CASCADE
        let result = query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        debug!("User deleted: {}", id);
        Ok(())
    }
}

#[async_trait]
impl ChatStore for PgStore {
    async fn create_chat(&self, owner_id: Uuid) -> StoreResult<Chat> {
        let chat = Chat::new(owner_id);
        let chat = query_as::<_, Chat>(
            r#"
            INSERT INTO chats (id, user_id, title, message_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(chat.id)
        .bind(chat.user_id)
        .bind(&chat.title)
        .bind(chat.message_count)
        .bind(chat.created_at)
        .bind(chat.updated_at)
        .fetch_one(&self.pool)
        .await?;

        debug!("Chat created: {:?}", chat);
        Ok(chat)
    }

    async fn find_chat(&self, chat_id: Uuid, owner_id: Uuid) -> StoreResult<Option<Chat>> {
        Ok(
            query_as::<_, Chat>("SELECT * FROM chats WHERE id = $1 AND user_id = $2")
                .bind(chat_id)
                .bind(owner_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn list_chats(&self, owner_id: Uuid) -> StoreResult<Vec<Chat>> {
        Ok(query_as::<_, Chat>(
            r#"
            SELECT * FROM chats
            WHERE user_id = $1 AND message_count > 0
            ORDER BY updated_at DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn messages(&self, chat_id: Uuid) -> StoreResult<Vec<Message>> {
        Ok(query_as::<_, Message>(
            r#"
            SELECT * FROM messages
            WHERE chat_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn append_message(
        &self,
        chat_id: Uuid,
        role: Role,
        content: &str,
    ) -> StoreResult<Message> {
        // Counter bump and insert run as one statement so concurrent appends
        // on the same chat always get distinct, gap-free positions.
        let message = query_as::<_, Message>(
            r#"
            WITH bumped AS (
                UPDATE chats
                SET message_count = message_count + 1, updated_at = $4
                WHERE id = $1
                RETURNING id, message_count
            )
            INSERT INTO messages (id, chat_id, seq, role, content, created_at)
            SELECT $2, bumped.id, bumped.message_count, $3, $5, $4 FROM bumped
            RETURNING *
            "#,
        )
        .bind(chat_id)
        .bind(Uuid::new_v4())
        .bind(role)
        .bind(Utc::now())
        .bind(content)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        debug!(chat_id = %chat_id, seq = message.seq, "Message appended");
        Ok(message)
    }

    async fn set_title(&self, chat_id: Uuid, title: &str) -> StoreResult<()> {
        let result = query("UPDATE chats SET title = $1, updated_at = $2 WHERE id = $3")
            .bind(title)
            .bind(Utc::now())
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl GrievanceStore for PgStore {
    async fn create_grievance(&self, grievance: &Grievance) -> StoreResult<Grievance> {
        Ok(query_as::<_, Grievance>(
            r#"
            INSERT INTO grievances (id, user_id, subject, message, mood, status, response, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(grievance.id)
        .bind(grievance.user_id)
        .bind(&grievance.subject)
        .bind(&grievance.message)
        .bind(&grievance.mood)
        .bind(grievance.status)
        .bind(&grievance.response)
        .bind(grievance.created_at)
        .bind(grievance.updated_at)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list_grievances_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Grievance>> {
        Ok(query_as::<_, Grievance>(
            "SELECT * FROM grievances WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_all_grievances(&self) -> StoreResult<Vec<Grievance>> {
        Ok(
            query_as::<_, Grievance>("SELECT * FROM grievances ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn respond_to_grievance(&self, id: Uuid, response: &str) -> StoreResult<Grievance> {
        query_as::<_, Grievance>(
            r#"
            UPDATE grievances
            SET response = $1, status = $2, updated_at = $3
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(response)
        .bind(GrievanceStatus::Responded)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }
}
