//! Vote ledger: one vote per user per email, with cached tallies.

use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use tracing::{debug, info, warn};

use super::model::{Tally, Vote, VoteChange, VoteChoice};
use crate::email::{
    EmailId, EmailRepository, UserId, parse_timestamp, tally_from_counts, timestamp,
};
use crate::{Error, Result};

/// Owns the vote rows and the tally columns derived from them.
///
/// Every mutation runs in a single transaction whose first statement writes
/// the email row. That takes the database write lock before anything is
/// read, so concurrent ballots on the same email apply one after another
/// and the cached tally never drifts from the vote rows.
#[derive(Debug, Clone)]
pub struct VoteLedger {
    pool: SqlitePool,
}

impl VoteLedger {
    /// Create a ledger over the repository's database.
    #[must_use]
    pub fn new(emails: &EmailRepository) -> Self {
        Self {
            pool: emails.pool().clone(),
        }
    }

    /// Cast or switch `user`'s vote on an email.
    ///
    /// Returns the tally after the update.
    ///
    /// # Errors
    ///
    /// - [`Error::EmailNotFound`] if the email does not exist.
    /// - [`Error::DuplicateVote`] if the user already holds this verdict;
    ///   nothing is changed.
    /// - [`Error::Database`] if the store fails; the transaction is rolled
    ///   back.
    pub async fn cast_vote(
        &self,
        user: UserId,
        email_id: EmailId,
        is_phishing: bool,
    ) -> Result<Tally> {
        let ballot = VoteChoice::from_is_phishing(is_phishing);
        let mut tx = self.pool.begin().await?;

        claim_email(&mut tx, email_id).await?;

        let existing = sqlx::query(
            r"
            SELECT is_phishing FROM votes
            WHERE user_id = ? AND email_id = ?
            ",
        )
        .bind(user.0)
        .bind(email_id.0)
        .fetch_optional(&mut *tx)
        .await?
        .map(|row| VoteChoice::from_is_phishing(row.get("is_phishing")));

        let Some(change) = VoteChange::plan(existing, ballot) else {
            warn!("User {user} already voted {ballot} on email {email_id}");
            return Err(Error::DuplicateVote {
                email_id,
                is_phishing,
            });
        };

        let now = timestamp(Utc::now());
        match change {
            VoteChange::Cast(choice) => {
                sqlx::query(
                    r"
                    INSERT INTO votes (user_id, email_id, is_phishing, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?)
                    ",
                )
                .bind(user.0)
                .bind(email_id.0)
                .bind(choice.is_phishing())
                .bind(&now)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
            }
            VoteChange::Switch { to, .. } => {
                sqlx::query(
                    r"
                    UPDATE votes
                    SET is_phishing = ?, updated_at = ?
                    WHERE user_id = ? AND email_id = ?
                    ",
                )
                .bind(to.is_phishing())
                .bind(&now)
                .bind(user.0)
                .bind(email_id.0)
                .execute(&mut *tx)
                .await?;
            }
        }

        let (phishing_delta, legitimate_delta) = change.deltas();
        let row = sqlx::query(
            r"
            UPDATE emails
            SET votes_phishing = MAX(votes_phishing + ?, 0),
                votes_legitimate = MAX(votes_legitimate + ?, 0)
            WHERE id = ?
            RETURNING votes_phishing, votes_legitimate
            ",
        )
        .bind(phishing_delta)
        .bind(legitimate_delta)
        .bind(email_id.0)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let tally = row_to_tally(&row);
        match change {
            VoteChange::Cast(choice) => {
                info!("User {user} voted {choice} on email {email_id}: {tally:?}");
            }
            VoteChange::Switch { from, to } => {
                info!("User {user} switched vote on email {email_id} from {from} to {to}: {tally:?}");
            }
        }
        Ok(tally)
    }

    /// Delete an email and every vote cast on it.
    ///
    /// # Errors
    ///
    /// - [`Error::EmailNotFound`] if the email does not exist.
    /// - [`Error::Forbidden`] if `user` did not submit the email.
    /// - [`Error::Database`] if the store fails.
    pub async fn delete_email(&self, user: UserId, email_id: EmailId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        claim_email(&mut tx, email_id).await?;

        let owner: i64 = sqlx::query("SELECT owner_id FROM emails WHERE id = ?")
            .bind(email_id.0)
            .fetch_one(&mut *tx)
            .await?
            .get("owner_id");

        if owner != user.0 {
            warn!("User {user} tried to delete email {email_id} owned by {owner}");
            return Err(Error::Forbidden(email_id));
        }

        let votes = sqlx::query("DELETE FROM votes WHERE email_id = ?")
            .bind(email_id.0)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM emails WHERE id = ?")
            .bind(email_id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            "User {user} deleted email {email_id} and {} vote(s)",
            votes.rows_affected()
        );
        Ok(())
    }

    /// Recompute an email's cached tally from its vote rows.
    ///
    /// Repairs tallies written outside the ledger. Returns the corrected
    /// tally.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmailNotFound`] if the email does not exist, or a
    /// database error.
    pub async fn reconcile(&self, email_id: EmailId) -> Result<Tally> {
        let mut tx = self.pool.begin().await?;

        claim_email(&mut tx, email_id).await?;

        let cached = sqlx::query("SELECT votes_phishing, votes_legitimate FROM emails WHERE id = ?")
            .bind(email_id.0)
            .fetch_one(&mut *tx)
            .await?;
        let cached = row_to_tally(&cached);

        let row = sqlx::query(
            r"
            UPDATE emails
            SET votes_phishing = (
                    SELECT COUNT(*) FROM votes WHERE email_id = emails.id AND is_phishing = 1
                ),
                votes_legitimate = (
                    SELECT COUNT(*) FROM votes WHERE email_id = emails.id AND is_phishing = 0
                )
            WHERE id = ?
            RETURNING votes_phishing, votes_legitimate
            ",
        )
        .bind(email_id.0)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let tally = row_to_tally(&row);
        if tally == cached {
            debug!("Tally for email {email_id} already consistent: {tally:?}");
        } else {
            warn!("Repaired tally for email {email_id}: {cached:?} -> {tally:?}");
        }
        Ok(tally)
    }

    /// Get `user`'s vote on an email, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or the stored row is corrupt.
    pub async fn vote_of(&self, user: UserId, email_id: EmailId) -> Result<Option<Vote>> {
        let row = sqlx::query(
            r"
            SELECT user_id, email_id, is_phishing, created_at, updated_at
            FROM votes
            WHERE user_id = ? AND email_id = ?
            ",
        )
        .bind(user.0)
        .bind(email_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_vote).transpose()
    }
}

/// Write-lock the email row for the rest of the transaction.
///
/// Doubles as the existence check.
async fn claim_email(tx: &mut Transaction<'_, Sqlite>, email_id: EmailId) -> Result<()> {
    let claimed = sqlx::query("UPDATE emails SET votes_phishing = votes_phishing WHERE id = ?")
        .bind(email_id.0)
        .execute(&mut **tx)
        .await?;

    if claimed.rows_affected() == 0 {
        debug!("Email {email_id} not found");
        return Err(Error::EmailNotFound(email_id));
    }
    Ok(())
}

fn row_to_tally(row: &SqliteRow) -> Tally {
    tally_from_counts(row.get("votes_phishing"), row.get("votes_legitimate"))
}

fn row_to_vote(row: &SqliteRow) -> Result<Vote> {
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Vote {
        user: UserId::new(row.get("user_id")),
        email_id: EmailId::new(row.get("email_id")),
        choice: VoteChoice::from_is_phishing(row.get("is_phishing")),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
