//! SQLite-backed ticket, user and staff store.

use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use hdb_core::{
    domain::{ChatId, ThreadId, TicketId, TopicRef, UserId},
    store::{normalize_ticket_text, StaffSource, TicketStore, UserDirectory},
    ticket::{
        lifecycle, page_offset, Attachment, DraftAttachment, MediaKind, RequesterProfile,
        StatusChange, StatusCounts, Ticket, TicketPage, TicketStatus, TransitionOutcome,
        UserProfile,
    },
    Error, Result,
};

const TICKET_COLUMNS: &str =
    "id, owner_id, text, status, created_at, updated_at, group_chat_id, thread_id";

pub struct SqliteTicketStore {
    conn: Mutex<Connection>,
}

fn db(e: rusqlite::Error) -> Error {
    Error::Store(e.to_string())
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time at storage precision, so returned rows equal re-read ones.
fn now() -> DateTime<Utc> {
    let t = Utc::now();
    t.with_nanosecond(t.nanosecond() / 1_000 * 1_000).unwrap_or(t)
}

fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| bad_column(idx, format!("bad timestamp {s:?}: {e}")))
}

fn bad_column(idx: usize, what: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, what.into())
}

fn row_to_ticket(row: &Row) -> rusqlite::Result<Ticket> {
    let status: String = row.get(3)?;
    let status = TicketStatus::parse(&status)
        .ok_or_else(|| bad_column(3, format!("unknown ticket status {status:?}")))?;
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;
    let chat: Option<i64> = row.get(6)?;
    let thread: Option<i32> = row.get(7)?;
    let forum = match (chat, thread) {
        (Some(c), Some(t)) => Some(TopicRef {
            chat_id: ChatId(c),
            thread_id: ThreadId(t),
        }),
        _ => None,
    };
    Ok(Ticket {
        id: TicketId(row.get(0)?),
        owner: UserId(row.get(1)?),
        text: row.get(2)?,
        status,
        created_at: parse_ts(4, &created_at)?,
        updated_at: parse_ts(5, &updated_at)?,
        forum,
    })
}

fn row_to_attachment(row: &Row) -> rusqlite::Result<Attachment> {
    let kind: String = row.get(2)?;
    let kind = MediaKind::parse(&kind)
        .ok_or_else(|| bad_column(2, format!("unknown attachment kind {kind:?}")))?;
    let created_at: String = row.get(6)?;
    Ok(Attachment {
        id: row.get(0)?,
        ticket_id: TicketId(row.get(1)?),
        kind,
        file_id: row.get(3)?,
        file_unique_id: row.get(4)?,
        caption: row.get(5)?,
        created_at: parse_ts(6, &created_at)?,
    })
}

fn row_to_user(row: &Row) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        telegram_id: row.get(0)?,
        username: row.get(1)?,
        name: row.get(2)?,
        phone: row.get(3)?,
        street: row.get(4)?,
        house: row.get(5)?,
        apartment: row.get(6)?,
    })
}

impl SqliteTicketStore {
    /// Open (creating if needed) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(db)?;
        Self::initialize_schema(&conn)?;
        info!(path = %path.display(), "sqlite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                telegram_id INTEGER PRIMARY KEY,
                username TEXT NOT NULL DEFAULT '',
                name TEXT NOT NULL,
                phone TEXT,
                street TEXT,
                house TEXT,
                apartment TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS staff (
                telegram_id INTEGER PRIMARY KEY,
                username TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS tickets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL REFERENCES users(telegram_id) ON DELETE CASCADE,
                text TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'open'
                    CHECK (status IN ('open', 'work', 'cancelled')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                group_chat_id INTEGER,
                thread_id INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_tickets_owner_status ON tickets(owner_id, status);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_tickets_topic
                ON tickets(group_chat_id, thread_id) WHERE thread_id IS NOT NULL;

            CREATE TABLE IF NOT EXISTS ticket_attachments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticket_id INTEGER NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
                kind TEXT NOT NULL,
                file_id TEXT NOT NULL,
                file_unique_id TEXT,
                caption TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_attachments_ticket ON ticket_attachments(ticket_id);
            "#,
        )
        .map_err(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Store("sqlite connection lock poisoned".to_string()))
    }

    /// Read-decide-write in one transaction. `guard` can veto before deciding.
    fn transition(
        &self,
        ticket_id: TicketId,
        target: TicketStatus,
        guard: impl FnOnce(UserId, TicketStatus) -> bool,
    ) -> Result<Option<StatusChange>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db)?;
        let current: Option<(i64, String)> = tx
            .query_row(
                "SELECT owner_id, status FROM tickets WHERE id = ?1",
                params![ticket_id.0],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .map_err(db)?;
        let Some((owner, status)) = current else {
            return Ok(None);
        };
        let from = TicketStatus::parse(&status)
            .ok_or_else(|| Error::Store(format!("ticket {ticket_id} has status {status:?}")))?;
        let owner = UserId(owner);
        if !guard(owner, from) {
            return Ok(None);
        }

        let outcome = lifecycle::decide(from, target);
        if outcome == TransitionOutcome::Applied {
            tx.execute(
                "UPDATE tickets SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![target.as_str(), ts(Utc::now()), ticket_id.0],
            )
            .map_err(db)?;
        }
        tx.commit().map_err(db)?;
        debug!(ticket_id = ticket_id.0, from = from.as_str(), to = target.as_str(), ?outcome, "status transition");

        Ok(Some(StatusChange {
            ticket_id,
            from,
            to: target,
            owner,
            outcome,
        }))
    }

    fn ticket_where(&self, clause: &str, args: impl rusqlite::Params) -> Result<Option<Ticket>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE {clause}"),
            args,
            row_to_ticket,
        )
        .optional()
        .map_err(db)
    }
}

#[async_trait]
impl TicketStore for SqliteTicketStore {
    async fn create(&self, owner: UserId, text: &str) -> Result<Ticket> {
        let text = normalize_ticket_text(text)?;
        let conn = self.lock()?;
        let known: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE telegram_id = ?1)",
                params![owner.0],
                |r| r.get(0),
            )
            .map_err(db)?;
        if !known {
            return Err(Error::NotFound(format!("user {}", owner.0)));
        }

        let now = now();
        conn.execute(
            "INSERT INTO tickets (owner_id, text, status, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
            params![owner.0, text, TicketStatus::Open.as_str(), ts(now)],
        )
        .map_err(db)?;

        Ok(Ticket {
            id: TicketId(conn.last_insert_rowid()),
            owner,
            text,
            status: TicketStatus::Open,
            created_at: now,
            updated_at: now,
            forum: None,
        })
    }

    async fn bind_forum(&self, ticket_id: TicketId, topic: TopicRef) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE tickets SET group_chat_id = ?1, thread_id = ?2, updated_at = ?3 \
                 WHERE id = ?4 AND group_chat_id IS NULL AND thread_id IS NULL",
                params![topic.chat_id.0, topic.thread_id.0, ts(Utc::now()), ticket_id.0],
            )
            .map_err(db)?;
        Ok(changed == 1)
    }

    async fn set_status(
        &self,
        ticket_id: TicketId,
        target: TicketStatus,
    ) -> Result<Option<StatusChange>> {
        self.transition(ticket_id, target, |_, _| true)
    }

    async fn cancel_if_owner(
        &self,
        owner: UserId,
        ticket_id: TicketId,
    ) -> Result<Option<StatusChange>> {
        let change = self.transition(ticket_id, TicketStatus::Cancelled, |actual, status| {
            actual == owner && status.is_active()
        })?;
        Ok(change.filter(StatusChange::applied))
    }

    async fn find_by_id(&self, ticket_id: TicketId) -> Result<Option<Ticket>> {
        self.ticket_where("id = ?1", params![ticket_id.0])
    }

    async fn find_by_thread(&self, topic: TopicRef) -> Result<Option<Ticket>> {
        self.ticket_where(
            "group_chat_id = ?1 AND thread_id = ?2",
            params![topic.chat_id.0, topic.thread_id.0],
        )
    }

    async fn find_for_owner(&self, owner: UserId, ticket_id: TicketId) -> Result<Option<Ticket>> {
        self.ticket_where("id = ?1 AND owner_id = ?2", params![ticket_id.0, owner.0])
    }

    async fn list_by_status(
        &self,
        owner: Option<UserId>,
        status: TicketStatus,
        page: u32,
        page_size: u32,
    ) -> Result<TicketPage> {
        let page = page.max(1);
        let owner_id = owner.map(|o| o.0);
        let conn = self.lock()?;

        let total: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM tickets WHERE status = ?1 AND (?2 IS NULL OR owner_id = ?2)",
                params![status.as_str(), owner_id],
                |r| r.get(0),
            )
            .map_err(db)?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TICKET_COLUMNS} FROM tickets \
                 WHERE status = ?1 AND (?2 IS NULL OR owner_id = ?2) \
                 ORDER BY created_at DESC, id DESC LIMIT ?3 OFFSET ?4"
            ))
            .map_err(db)?;
        let items = stmt
            .query_map(
                params![
                    status.as_str(),
                    owner_id,
                    i64::from(page_size),
                    page_offset(page, page_size) as i64
                ],
                row_to_ticket,
            )
            .map_err(db)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db)?;

        Ok(TicketPage {
            items,
            total: total.max(0) as u64,
            page,
            page_size,
        })
    }

    async fn count_by_status(&self, owner: Option<UserId>) -> Result<StatusCounts> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT status, COUNT(*) FROM tickets \
                 WHERE (?1 IS NULL OR owner_id = ?1) GROUP BY status",
            )
            .map_err(db)?;
        let rows = stmt
            .query_map(params![owner.map(|o| o.0)], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
            })
            .map_err(db)?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let (status, n) = row.map_err(db)?;
            let n = n.max(0) as u64;
            match TicketStatus::parse(&status) {
                Some(TicketStatus::Open) => counts.open = n,
                Some(TicketStatus::Work) => counts.work = n,
                Some(TicketStatus::Cancelled) => counts.cancelled = n,
                None => {}
            }
        }
        Ok(counts)
    }

    async fn add_attachment(
        &self,
        ticket_id: TicketId,
        attachment: &DraftAttachment,
    ) -> Result<Attachment> {
        let conn = self.lock()?;
        let now = now();
        let inserted = conn.execute(
            "INSERT INTO ticket_attachments (ticket_id, kind, file_id, file_unique_id, caption, created_at) \
             SELECT id, ?2, ?3, ?4, ?5, ?6 FROM tickets WHERE id = ?1",
            params![
                ticket_id.0,
                attachment.kind.as_str(),
                attachment.file_id,
                attachment.file_unique_id,
                attachment.caption,
                ts(now)
            ],
        )
        .map_err(db)?;
        if inserted == 0 {
            return Err(Error::NotFound(format!("ticket {ticket_id}")));
        }
        Ok(Attachment {
            id: conn.last_insert_rowid(),
            ticket_id,
            kind: attachment.kind,
            file_id: attachment.file_id.clone(),
            file_unique_id: attachment.file_unique_id.clone(),
            caption: attachment.caption.clone(),
            created_at: now,
        })
    }

    async fn attachments(&self, ticket_id: TicketId) -> Result<Vec<Attachment>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, ticket_id, kind, file_id, file_unique_id, caption, created_at \
                 FROM ticket_attachments WHERE ticket_id = ?1 ORDER BY id",
            )
            .map_err(db)?;
        let rows = stmt
            .query_map(params![ticket_id.0], row_to_attachment)
            .map_err(db)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db)?;
        Ok(rows)
    }
}

#[async_trait]
impl UserDirectory for SqliteTicketStore {
    async fn register_user(&self, profile: &UserProfile) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db)?;
        let existed: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE telegram_id = ?1)",
                params![profile.telegram_id],
                |r| r.get(0),
            )
            .map_err(db)?;
        tx.execute(
            "INSERT INTO users (telegram_id, username, name, phone, street, house, apartment, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT(telegram_id) DO UPDATE SET \
               username = excluded.username, name = excluded.name, phone = excluded.phone, \
               street = excluded.street, house = excluded.house, apartment = excluded.apartment",
            params![
                profile.telegram_id,
                profile.username,
                profile.name,
                profile.phone,
                profile.street,
                profile.house,
                profile.apartment,
                ts(Utc::now())
            ],
        )
        .map_err(db)?;
        tx.commit().map_err(db)?;
        Ok(!existed)
    }

    async fn requester_profile(&self, user: UserId) -> Result<Option<RequesterProfile>> {
        let conn = self.lock()?;
        let profile = conn
            .query_row(
                "SELECT telegram_id, username, name, phone, street, house, apartment \
                 FROM users WHERE telegram_id = ?1",
                params![user.0],
                row_to_user,
            )
            .optional()
            .map_err(db)?;
        Ok(profile.as_ref().map(RequesterProfile::from))
    }

    async fn delete_user(&self, user: UserId) -> Result<bool> {
        let conn = self.lock()?;
        let removed = conn
            .execute("DELETE FROM users WHERE telegram_id = ?1", params![user.0])
            .map_err(db)?;
        if removed > 0 {
            info!(user_id = user.0, "user deleted with their tickets");
        }
        Ok(removed > 0)
    }
}

#[async_trait]
impl StaffSource for SqliteTicketStore {
    async fn list_staff_ids(&self) -> Result<Vec<UserId>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT telegram_id FROM staff ORDER BY telegram_id")
            .map_err(db)?;
        let ids = stmt
            .query_map([], |r| r.get::<_, i64>(0))
            .map_err(db)?
            .map(|r| r.map(UserId))
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db)?;
        Ok(ids)
    }

    async fn add_staff(&self, user: UserId, username: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO staff (telegram_id, username) VALUES (?1, ?2) \
             ON CONFLICT(telegram_id) DO UPDATE SET username = \
               CASE WHEN excluded.username = '' THEN staff.username ELSE excluded.username END",
            params![user.0, username],
        )
        .map_err(db)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: i64) -> UserProfile {
        UserProfile {
            telegram_id: id,
            username: format!("user{id}"),
            name: format!("Resident {id}"),
            phone: Some("+100200".into()),
            street: Some("Lenina".into()),
            house: Some("5".into()),
            apartment: None,
        }
    }

    async fn store_with_user(id: i64) -> SqliteTicketStore {
        let store = SqliteTicketStore::in_memory().unwrap();
        assert!(store.register_user(&profile(id)).await.unwrap());
        store
    }

    fn topic(thread: i32) -> TopicRef {
        TopicRef {
            chat_id: ChatId(-100500),
            thread_id: ThreadId(thread),
        }
    }

    #[tokio::test]
    async fn register_is_upsert() {
        let store = store_with_user(1).await;
        let mut p = profile(1);
        p.apartment = Some("12".into());
        assert!(!store.register_user(&p).await.unwrap());
        let r = store.requester_profile(UserId(1)).await.unwrap().unwrap();
        assert_eq!(r.address.as_deref(), Some("Lenina, h. 5, apt. 12"));
        assert_eq!(r.username.as_deref(), Some("user1"));
        assert!(store.requester_profile(UserId(9)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_validates_owner_and_text() {
        let store = store_with_user(1).await;
        assert!(matches!(
            store.create(UserId(2), "Leaking pipe").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            store.create(UserId(1), "   ").await,
            Err(Error::Validation(_))
        ));
        let t = store.create(UserId(1), "  Leaking pipe  ").await.unwrap();
        assert_eq!(t.text, "Leaking pipe");
        assert_eq!(t.status, TicketStatus::Open);
        assert_eq!(store.find_by_id(t.id).await.unwrap(), Some(t));
    }

    #[tokio::test]
    async fn corrupt_timestamp_is_a_store_error() {
        let store = store_with_user(1).await;
        let t = store.create(UserId(1), "Leaking pipe").await.unwrap();
        store
            .lock()
            .unwrap()
            .execute(
                "UPDATE tickets SET updated_at = 'yesterday' WHERE id = ?1",
                params![t.id.0],
            )
            .unwrap();
        assert!(matches!(store.find_by_id(t.id).await, Err(Error::Store(_))));
    }

    #[tokio::test]
    async fn forum_binding_is_set_once_and_resolvable() {
        let store = store_with_user(1).await;
        let t = store.create(UserId(1), "No hot water").await.unwrap();
        assert!(store.bind_forum(t.id, topic(77)).await.unwrap());
        assert!(!store.bind_forum(t.id, topic(78)).await.unwrap());
        assert!(!store.bind_forum(TicketId(999), topic(79)).await.unwrap());

        assert_eq!(store.thread_of(t.id).await.unwrap(), Some(topic(77)));
        let found = store.find_by_thread(topic(77)).await.unwrap().unwrap();
        assert_eq!(found.id, t.id);
        assert!(store.find_by_thread(topic(78)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_changes_follow_lifecycle() {
        let store = store_with_user(1).await;
        let t = store.create(UserId(1), "Broken lift").await.unwrap();

        let c = store.set_status(t.id, TicketStatus::Work).await.unwrap().unwrap();
        assert_eq!(c.outcome, TransitionOutcome::Applied);
        assert_eq!((c.from, c.to, c.owner), (TicketStatus::Open, TicketStatus::Work, UserId(1)));

        let c = store.set_status(t.id, TicketStatus::Work).await.unwrap().unwrap();
        assert_eq!(c.outcome, TransitionOutcome::AlreadyInStatus);

        store.set_status(t.id, TicketStatus::Cancelled).await.unwrap();
        let c = store.set_status(t.id, TicketStatus::Open).await.unwrap().unwrap();
        assert_eq!(c.outcome, TransitionOutcome::Rejected);
        let row = store.find_by_id(t.id).await.unwrap().unwrap();
        assert_eq!(row.status, TicketStatus::Cancelled);

        assert!(store.set_status(TicketId(999), TicketStatus::Work).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn owner_cancel_is_guarded() {
        let store = store_with_user(1).await;
        store.register_user(&profile(2)).await.unwrap();
        let t = store.create(UserId(1), "Dripping tap").await.unwrap();

        assert!(store.cancel_if_owner(UserId(2), t.id).await.unwrap().is_none());
        let c = store.cancel_if_owner(UserId(1), t.id).await.unwrap().unwrap();
        assert_eq!((c.from, c.to), (TicketStatus::Open, TicketStatus::Cancelled));
        assert!(store.cancel_if_owner(UserId(1), t.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn listing_pages_newest_first_per_owner() {
        let store = store_with_user(1).await;
        store.register_user(&profile(2)).await.unwrap();
        for i in 0..7 {
            store.create(UserId(1), &format!("ticket {i}")).await.unwrap();
        }
        store.create(UserId(2), "someone else").await.unwrap();
        store.set_status(TicketId(1), TicketStatus::Work).await.unwrap();

        let p1 = store
            .list_by_status(Some(UserId(1)), TicketStatus::Open, 1, 5)
            .await
            .unwrap();
        assert_eq!(p1.total, 6);
        assert_eq!(p1.page_count(), 2);
        assert_eq!(p1.items.first().map(|t| t.id), Some(TicketId(7)));

        let p2 = store
            .list_by_status(Some(UserId(1)), TicketStatus::Open, 2, 5)
            .await
            .unwrap();
        assert_eq!(p2.items.len(), 1);
        assert_eq!(p2.items[0].id, TicketId(2));

        let all = store.list_by_status(None, TicketStatus::Open, 1, 20).await.unwrap();
        assert_eq!(all.total, 7);

        let counts = store.count_by_status(Some(UserId(1))).await.unwrap();
        assert_eq!((counts.open, counts.work, counts.cancelled), (6, 1, 0));
    }

    #[tokio::test]
    async fn attachments_need_a_ticket_and_keep_order() {
        let store = store_with_user(1).await;
        let t = store.create(UserId(1), "Cracked window").await.unwrap();
        for (i, kind) in [MediaKind::Photo, MediaKind::Voice].into_iter().enumerate() {
            store
                .add_attachment(
                    t.id,
                    &DraftAttachment {
                        kind,
                        file_id: format!("f{i}"),
                        file_unique_id: None,
                        caption: None,
                    },
                )
                .await
                .unwrap();
        }
        let stored = store.attachments(t.id).await.unwrap();
        assert_eq!(
            stored.iter().map(|a| a.kind).collect::<Vec<_>>(),
            vec![MediaKind::Photo, MediaKind::Voice]
        );

        let missing = store
            .add_attachment(
                TicketId(999),
                &DraftAttachment {
                    kind: MediaKind::Photo,
                    file_id: "x".into(),
                    file_unique_id: None,
                    caption: None,
                },
            )
            .await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn deleting_user_cascades_to_tickets_and_attachments() {
        let store = store_with_user(1).await;
        let t = store.create(UserId(1), "Mould in bathroom").await.unwrap();
        store
            .add_attachment(
                t.id,
                &DraftAttachment {
                    kind: MediaKind::Photo,
                    file_id: "p".into(),
                    file_unique_id: None,
                    caption: None,
                },
            )
            .await
            .unwrap();

        assert!(store.delete_user(UserId(1)).await.unwrap());
        assert!(!store.delete_user(UserId(1)).await.unwrap());
        assert!(store.find_by_id(t.id).await.unwrap().is_none());
        assert!(store.attachments(t.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn staff_upsert_and_listing() {
        let store = SqliteTicketStore::in_memory().unwrap();
        store.add_staff(UserId(11), "bob").await.unwrap();
        store.add_staff(UserId(10), "alice").await.unwrap();
        store.add_staff(UserId(11), "bobby").await.unwrap();
        assert_eq!(store.list_staff_ids().await.unwrap(), vec![UserId(10), UserId(11)]);
    }
}
