//! Active branch context per repository.

use crate::{storage_err, timestamp, Storage};
use codeprism_core::{ActiveContext, CodeprismError};
use rusqlite::{params, OptionalExtension};

impl Storage {
    pub fn set_active_context(&self, ctx: &ActiveContext) -> Result<(), CodeprismError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO active_context (repository, branch, sync_level, context, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(repository) DO UPDATE SET
                branch = excluded.branch,
                sync_level = excluded.sync_level,
                context = excluded.context,
                updated_at = excluded.updated_at",
            params![
                ctx.repository,
                ctx.branch,
                ctx.sync_level.as_str(),
                serde_json::to_string(&ctx.context)?,
                ctx.updated_at.timestamp(),
            ],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    pub fn active_context(&self, repo: &str) -> Result<Option<ActiveContext>, CodeprismError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT branch, sync_level, context, updated_at FROM active_context WHERE repository = ?1",
                params![repo],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(storage_err)?;
        match row {
            Some((branch, level, context, updated_at)) => Ok(Some(ActiveContext {
                repository: repo.to_string(),
                branch,
                sync_level: level.parse()?,
                context: serde_json::from_str(&context)?,
                updated_at: timestamp(updated_at),
            })),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeprism_core::{BranchContext, SyncLevel};

    #[test]
    fn latest_context_wins() {
        let storage = Storage::open_in_memory().unwrap();
        let mut ctx = ActiveContext {
            repository: "backend".into(),
            branch: "main".into(),
            sync_level: SyncLevel::Full,
            context: BranchContext::default(),
            updated_at: chrono::Utc::now(),
        };
        storage.set_active_context(&ctx).unwrap();
        ctx.branch = "feature/ENG-1-x".into();
        ctx.sync_level = SyncLevel::Lightweight;
        ctx.context.ticket_id = Some("ENG-1".into());
        storage.set_active_context(&ctx).unwrap();

        let got = storage.active_context("backend").unwrap().unwrap();
        assert_eq!(got.branch, "feature/ENG-1-x");
        assert_eq!(got.sync_level, SyncLevel::Lightweight);
        assert_eq!(got.context.ticket_id.as_deref(), Some("ENG-1"));
        assert!(storage.active_context("web").unwrap().is_none());
    }
}
