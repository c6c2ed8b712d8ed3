//! Email storage repository.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::debug;

use super::model::{Email, EmailFilter, EmailId, EmailView, UserId};
use crate::request::NewEmail;
use crate::vote::{Tally, VoteChoice};
use crate::Result;

const EMAIL_COLUMNS: &str = "e.id, e.owner_id, e.sender_domain, e.subject, e.content, \
     e.submission_date, e.extracted_urls, e.votes_phishing, e.votes_legitimate, e.created_at";

/// Repository for submitted emails and the vote rows that hang off them.
///
/// Tally columns are written only through [`crate::VoteLedger`], which
/// shares this repository's pool.
#[derive(Debug, Clone)]
pub struct EmailRepository {
    pool: SqlitePool,
}

impl EmailRepository {
    /// Create a new repository with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Pool shared with the vote ledger.
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS emails (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL,
                sender_domain TEXT NOT NULL,
                subject TEXT NOT NULL,
                content TEXT NOT NULL,
                submission_date TEXT NOT NULL,
                extracted_urls TEXT NOT NULL DEFAULT '[]',
                votes_phishing INTEGER NOT NULL DEFAULT 0 CHECK (votes_phishing >= 0),
                votes_legitimate INTEGER NOT NULL DEFAULT 0 CHECK (votes_legitimate >= 0),
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS votes (
                user_id INTEGER NOT NULL,
                email_id INTEGER NOT NULL REFERENCES emails(id) ON DELETE CASCADE,
                is_phishing INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, email_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Index for per-email tally recomputation and cascades
        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_votes_email
            ON votes(email_id, is_phishing)
            ",
        )
        .execute(&self.pool)
        .await?;

        // Index for newest-first listing
        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_emails_created
            ON emails(created_at DESC, id DESC)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store a new email owned by `owner`.
    ///
    /// The caller is responsible for redacting subject and content first.
    /// Tallies start at zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn create(&self, owner: UserId, email: &NewEmail) -> Result<Email> {
        let created_at = Utc::now().trunc_subsecs(6);
        let urls_json = serde_json::to_string(&email.extracted_urls)?;

        let result = sqlx::query(
            r"
            INSERT INTO emails
                (owner_id, sender_domain, subject, content, submission_date,
                 extracted_urls, votes_phishing, votes_legitimate, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 0, 0, ?)
            ",
        )
        .bind(owner.0)
        .bind(&email.sender_domain)
        .bind(&email.subject)
        .bind(&email.content)
        .bind(&email.submission_date)
        .bind(&urls_json)
        .bind(timestamp(created_at))
        .execute(&self.pool)
        .await?;

        let id = EmailId::new(result.last_insert_rowid());
        debug!("Stored email {id} for user {owner}");

        Ok(Email {
            id,
            sender_domain: email.sender_domain.clone(),
            subject: email.subject.clone(),
            content: email.content.clone(),
            submission_date: email.submission_date.clone(),
            extracted_urls: email.extracted_urls.clone(),
            tally: Tally::default(),
            owner,
            created_at,
        })
    }

    /// Get email by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or the stored row is corrupt.
    pub async fn get(&self, id: EmailId) -> Result<Option<Email>> {
        let sql = format!("SELECT {EMAIL_COLUMNS} FROM emails e WHERE e.id = ?");
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_email).transpose()
    }

    /// List emails for `viewer`, newest first, annotated with the viewer's vote.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or a stored row is corrupt.
    pub async fn list(&self, viewer: UserId, filter: &EmailFilter) -> Result<Vec<EmailView>> {
        let sql = format!(
            r"
            SELECT {EMAIL_COLUMNS}, v.is_phishing AS viewer_vote
            FROM emails e
            LEFT JOIN votes v ON v.email_id = e.id AND v.user_id = ?
            WHERE (? = 0 OR e.owner_id = ?)
              AND (? = 0 OR v.user_id IS NULL)
              AND (? IS NULL OR e.sender_domain = ? COLLATE NOCASE)
              AND e.votes_phishing >= ?
            ORDER BY e.created_at DESC, e.id DESC
            "
        );

        let rows = sqlx::query(&sql)
            .bind(viewer.0)
            .bind(filter.mine_only)
            .bind(viewer.0)
            .bind(filter.unvoted_only)
            .bind(filter.sender_domain.as_deref())
            .bind(filter.sender_domain.as_deref())
            .bind(i64::from(filter.min_phishing_votes.unwrap_or(0)))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let email = row_to_email(row)?;
                let vote = row
                    .get::<Option<bool>, _>("viewer_vote")
                    .map(VoteChoice::from_is_phishing);
                Ok(EmailView::new(email, viewer, vote))
            })
            .collect()
    }

    /// Count the persisted votes for an email, per verdict.
    ///
    /// This is the source of truth the cached tally must agree with.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count_votes(&self, id: EmailId) -> Result<Tally> {
        let row = sqlx::query(
            r"
            SELECT
                COALESCE(SUM(CASE WHEN is_phishing = 1 THEN 1 ELSE 0 END), 0) AS phishing,
                COALESCE(SUM(CASE WHEN is_phishing = 0 THEN 1 ELSE 0 END), 0) AS legitimate
            FROM votes
            WHERE email_id = ?
            ",
        )
        .bind(id.0)
        .fetch_one(&self.pool)
        .await?;

        Ok(tally_from_counts(row.get("phishing"), row.get("legitimate")))
    }
}

/// Format a timestamp for storage.
///
/// Fixed precision keeps lexical order equal to chronological order.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

/// Build a tally from raw counter columns.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn tally_from_counts(phishing: i64, legitimate: i64) -> Tally {
    Tally::new(phishing.max(0) as u32, legitimate.max(0) as u32)
}

/// Convert a database row to an `Email`.
fn row_to_email(row: &SqliteRow) -> Result<Email> {
    let urls: String = row.get("extracted_urls");
    let created_at: String = row.get("created_at");

    Ok(Email {
        id: EmailId::new(row.get("id")),
        sender_domain: row.get("sender_domain"),
        subject: row.get("subject"),
        content: row.get("content"),
        submission_date: row.get("submission_date"),
        extracted_urls: serde_json::from_str(&urls)?,
        tally: tally_from_counts(row.get("votes_phishing"), row.get("votes_legitimate")),
        owner: UserId::new(row.get("owner_id")),
        created_at: parse_timestamp(&created_at)?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn new_email(domain: &str) -> NewEmail {
        NewEmail {
            sender_domain: domain.into(),
            subject: "Urgent: verify your account".into(),
            content: "Click the link below".into(),
            submission_date: "2024-01-01".into(),
            extracted_urls: vec!["evil.example (1 link)".into()],
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = EmailRepository::in_memory().await.unwrap();
        let owner = UserId::new(1);

        let created = repo.create(owner, &new_email("test.com")).await.unwrap();
        let fetched = repo.get(created.id).await.unwrap().unwrap();

        assert_eq!(fetched, created);
        assert_eq!(fetched.tally, Tally::default());
        assert_eq!(fetched.extracted_urls, vec!["evil.example (1 link)".to_string()]);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let repo = EmailRepository::in_memory().await.unwrap();
        assert!(repo.get(EmailId::new(42)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let repo = EmailRepository::in_memory().await.unwrap();
        let owner = UserId::new(1);

        let first = repo.create(owner, &new_email("a.com")).await.unwrap();
        let second = repo.create(owner, &new_email("b.com")).await.unwrap();

        let listed = repo.list(owner, &EmailFilter::default()).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|v| v.email.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert!(listed.iter().all(|v| v.is_mine && !v.user_vote));
    }

    #[tokio::test]
    async fn test_list_filters() {
        let repo = EmailRepository::in_memory().await.unwrap();
        let alice = UserId::new(1);
        let bob = UserId::new(2);

        repo.create(alice, &new_email("example.com")).await.unwrap();
        repo.create(bob, &new_email("phishing.com")).await.unwrap();

        let mine = EmailFilter {
            mine_only: true,
            ..EmailFilter::default()
        };
        let listed = repo.list(bob, &mine).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].email.sender_domain, "phishing.com");

        let by_domain = EmailFilter {
            sender_domain: Some("EXAMPLE.com".into()),
            ..EmailFilter::default()
        };
        let listed = repo.list(bob, &by_domain).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].email.owner, alice);
        assert!(!listed[0].is_mine);

        let popular = EmailFilter {
            min_phishing_votes: Some(1),
            ..EmailFilter::default()
        };
        assert!(repo.list(bob, &popular).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_count_votes_empty() {
        let repo = EmailRepository::in_memory().await.unwrap();
        let email = repo
            .create(UserId::new(1), &new_email("test.com"))
            .await
            .unwrap();

        assert_eq!(repo.count_votes(email.id).await.unwrap(), Tally::default());
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let now = Utc::now();
        let parsed = parse_timestamp(&timestamp(now)).unwrap();
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }
}
