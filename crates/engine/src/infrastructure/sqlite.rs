//! SQLite-backed game store and bearer-token identity.
//!
//! Stands in for the matchmaking/accounts side of the backend: it owns the
//! `games`, `moves` and `auth_tokens` tables. Remaining clock time is stored
//! as whole milliseconds, timestamps as RFC 3339 text.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

use chessroom_domain::{
    GameId, GameOutcome, GameStatus, MoveRecord, Seat, SessionSeed, UciMove, UserId,
};

use crate::infrastructure::ports::{ClockPort, GameStore, IdentityPort, RepoError};

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS games (
        id TEXT PRIMARY KEY,
        white_id INTEGER,
        black_id INTEGER,
        white_name TEXT NOT NULL DEFAULT '',
        black_name TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL,
        mode TEXT NOT NULL,
        time_control TEXT NOT NULL,
        fen TEXT NOT NULL,
        white_time_remaining_ms INTEGER,
        black_time_remaining_ms INTEGER,
        last_move_at TEXT,
        result TEXT,
        reason TEXT,
        started_at TEXT,
        finished_at TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS moves (
        game_id TEXT NOT NULL REFERENCES games(id),
        move_number INTEGER NOT NULL,
        side TEXT NOT NULL,
        player_id INTEGER,
        from_square TEXT NOT NULL,
        to_square TEXT NOT NULL,
        promotion TEXT,
        notation TEXT NOT NULL,
        white_time_remaining_ms INTEGER NOT NULL,
        black_time_remaining_ms INTEGER NOT NULL,
        played_at TEXT NOT NULL,
        PRIMARY KEY (game_id, move_number)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS auth_tokens (
        token TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
];

/// SQLite implementation of [`GameStore`] and [`IdentityPort`].
pub struct SqliteGameStore {
    pool: SqlitePool,
    clock: Arc<dyn ClockPort>,
}

impl SqliteGameStore {
    /// Open (creating if needed) the database file at `db_path`.
    pub async fn new(db_path: &str, clock: Arc<dyn ClockPort>) -> Result<Self, RepoError> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", db_path))
            .await
            .map_err(|e| RepoError::database("connect", e))?;
        Self::from_pool(pool, clock).await
    }

    /// A private in-memory database. One connection, so every query sees the
    /// same database.
    pub async fn in_memory(clock: Arc<dyn ClockPort>) -> Result<Self, RepoError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| RepoError::database("connect", e))?;
        Self::from_pool(pool, clock).await
    }

    async fn from_pool(pool: SqlitePool, clock: Arc<dyn ClockPort>) -> Result<Self, RepoError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|e| RepoError::database("schema", e))?;
        }
        Ok(Self { pool, clock })
    }

    /// Insert a game as matchmaking would after pairing two players.
    pub async fn create_game(&self, seed: &SessionSeed) -> Result<(), RepoError> {
        let now = self.clock.now();
        let started_at = (seed.status != GameStatus::Waiting).then(|| now.to_rfc3339());

        sqlx::query(
            r#"
            INSERT INTO games (
                id, white_id, black_id, white_name, black_name, status, mode,
                time_control, fen, white_time_remaining_ms, black_time_remaining_ms,
                last_move_at, started_at, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(seed.game_id.as_str())
        .bind(user_to_db(seed.white.user_id)?)
        .bind(user_to_db(seed.black.user_id)?)
        .bind(&seed.white.name)
        .bind(&seed.black.name)
        .bind(seed.status.as_str())
        .bind(seed.mode.as_str())
        .bind(seed.time_control.to_string())
        .bind(&seed.starting_position)
        .bind(seed.white_remaining.map(millis_to_db).transpose()?)
        .bind(seed.black_remaining.map(millis_to_db).transpose()?)
        .bind(seed.last_move_at.map(|t| t.to_rfc3339()))
        .bind(started_at)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("create_game", e))?;

        Ok(())
    }

    /// Issue a bearer token for `user_id`, as the accounts side does at login.
    pub async fn issue_token(&self, user_id: UserId) -> Result<String, RepoError> {
        let token = Uuid::new_v4().simple().to_string();

        sqlx::query("INSERT INTO auth_tokens (token, user_id, created_at) VALUES (?, ?, ?)")
            .bind(&token)
            .bind(user_to_db(Some(user_id))?)
            .bind(self.clock.now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::database("issue_token", e))?;

        Ok(token)
    }

    async fn load_history(&self, game_id: &GameId) -> Result<Vec<UciMove>, RepoError> {
        let rows = sqlx::query(
            "SELECT notation FROM moves WHERE game_id = ? ORDER BY move_number ASC",
        )
        .bind(game_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("resolve_session", e))?;

        rows.iter()
            .map(|row| {
                let notation: String = column(row, "notation")?;
                UciMove::parse(&notation).map_err(RepoError::serialization)
            })
            .collect()
    }
}

#[async_trait]
impl GameStore for SqliteGameStore {
    async fn resolve_session(&self, game_id: &GameId) -> Result<SessionSeed, RepoError> {
        let row = sqlx::query(
            r#"
            SELECT white_id, black_id, white_name, black_name, status, mode, time_control,
                   fen, white_time_remaining_ms, black_time_remaining_ms, last_move_at
            FROM games WHERE id = ?
            "#,
        )
        .bind(game_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::database("resolve_session", e))?
        .ok_or_else(|| RepoError::not_found("Game", game_id))?;

        let white = Seat {
            user_id: user_from_db(column(&row, "white_id")?)?,
            name: column(&row, "white_name")?,
        };
        let black = Seat {
            user_id: user_from_db(column(&row, "black_id")?)?,
            name: column(&row, "black_name")?,
        };
        let status = column::<String>(&row, "status")?
            .parse()
            .map_err(RepoError::serialization)?;
        let mode = column::<String>(&row, "mode")?
            .parse()
            .map_err(RepoError::serialization)?;
        let time_control = column::<String>(&row, "time_control")?
            .parse()
            .map_err(RepoError::serialization)?;
        let last_move_at = column::<Option<String>>(&row, "last_move_at")?
            .map(|raw| parse_timestamp(&raw))
            .transpose()?;

        Ok(SessionSeed {
            game_id: game_id.clone(),
            starting_position: column(&row, "fen")?,
            white,
            black,
            status,
            mode,
            time_control,
            history: self.load_history(game_id).await?,
            white_remaining: millis_from_db(column(&row, "white_time_remaining_ms")?)?,
            black_remaining: millis_from_db(column(&row, "black_time_remaining_ms")?)?,
            last_move_at,
        })
    }

    async fn append_move(&self, game_id: &GameId, record: &MoveRecord) -> Result<(), RepoError> {
        let white_ms = millis_to_db(record.white_remaining)?;
        let black_ms = millis_to_db(record.black_remaining)?;
        let played_at = record.played_at.to_rfc3339();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::database("append_move", e))?;

        sqlx::query(
            r#"
            INSERT INTO moves (
                game_id, move_number, side, player_id, from_square, to_square, promotion,
                notation, white_time_remaining_ms, black_time_remaining_ms, played_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(game_id.as_str())
        .bind(i64::from(record.move_number))
        .bind(record.side.as_str())
        .bind(user_to_db(record.player_id)?)
        .bind(record.notation.from_square())
        .bind(record.notation.to_square())
        .bind(record.notation.promotion().map(String::from))
        .bind(record.notation.as_str())
        .bind(white_ms)
        .bind(black_ms)
        .bind(&played_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepoError::database("append_move", e))?;

        // A waiting game becomes active with its first move.
        let updated = sqlx::query(
            r#"
            UPDATE games SET
                white_time_remaining_ms = ?,
                black_time_remaining_ms = ?,
                last_move_at = ?,
                status = CASE WHEN status = 'waiting' THEN 'active' ELSE status END,
                started_at = COALESCE(started_at, ?)
            WHERE id = ?
            "#,
        )
        .bind(white_ms)
        .bind(black_ms)
        .bind(&played_at)
        .bind(&played_at)
        .bind(game_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepoError::database("append_move", e))?;

        if updated.rows_affected() == 0 {
            return Err(RepoError::not_found("Game", game_id));
        }

        tx.commit()
            .await
            .map_err(|e| RepoError::database("append_move", e))?;

        Ok(())
    }

    async fn finalize(&self, game_id: &GameId, outcome: &GameOutcome) -> Result<(), RepoError> {
        let updated = sqlx::query(
            r#"
            UPDATE games SET status = 'finished', result = ?, reason = ?, finished_at = ?
            WHERE id = ?
            "#,
        )
        .bind(outcome.result.as_str())
        .bind(outcome.reason.as_str())
        .bind(self.clock.now().to_rfc3339())
        .bind(game_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("finalize", e))?;

        if updated.rows_affected() == 0 {
            return Err(RepoError::not_found("Game", game_id));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityPort for SqliteGameStore {
    async fn resolve_bearer(&self, token: &str) -> Result<Option<UserId>, RepoError> {
        let row = sqlx::query("SELECT user_id FROM auth_tokens WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("resolve_bearer", e))?;

        match row {
            Some(row) => user_from_db(Some(column(&row, "user_id")?)),
            None => Ok(None),
        }
    }
}

fn column<T>(row: &SqliteRow, name: &str) -> Result<T, RepoError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(RepoError::serialization)
}

fn user_to_db(user_id: Option<UserId>) -> Result<Option<i64>, RepoError> {
    user_id
        .map(|id| {
            i64::try_from(id.get())
                .map_err(|_| RepoError::constraint(format!("user id out of range: {id}")))
        })
        .transpose()
}

fn user_from_db(raw: Option<i64>) -> Result<Option<UserId>, RepoError> {
    raw.map(|raw| {
        u64::try_from(raw)
            .map(UserId::new)
            .map_err(|_| RepoError::serialization(format!("negative user id: {raw}")))
    })
    .transpose()
}

fn millis_to_db(duration: Duration) -> Result<i64, RepoError> {
    i64::try_from(duration.as_millis())
        .map_err(|_| RepoError::constraint(format!("clock value out of range: {duration:?}")))
}

fn millis_from_db(raw: Option<i64>) -> Result<Option<Duration>, RepoError> {
    raw.map(|ms| {
        u64::try_from(ms)
            .map(Duration::from_millis)
            .map_err(|_| RepoError::serialization(format!("negative clock value: {ms}")))
    })
    .transpose()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepoError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(RepoError::serialization)
}
