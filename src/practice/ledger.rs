use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use chrono::Utc;

use crate::db::{Database, FinishedSession, PracticeSessionRecord};

pub type LedgerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Where practice sessions are recorded. Start opens a row and hands back its
/// id; finish writes the results once.
pub trait SessionLedger: Send + Sync {
    fn start<'a>(&'a self, user_id: &'a str, video_id: i64) -> LedgerFuture<'a, String>;

    fn finish<'a>(
        &'a self,
        session_id: &'a str,
        result: FinishedSession,
    ) -> LedgerFuture<'a, PracticeSessionRecord>;

    fn abandon<'a>(&'a self, session_id: &'a str) -> LedgerFuture<'a, ()>;
}

impl SessionLedger for Database {
    fn start<'a>(&'a self, user_id: &'a str, video_id: i64) -> LedgerFuture<'a, String> {
        Box::pin(async move {
            let record = self.start_practice_session(user_id, video_id).await?;
            Ok(record.id)
        })
    }

    fn finish<'a>(
        &'a self,
        session_id: &'a str,
        result: FinishedSession,
    ) -> LedgerFuture<'a, PracticeSessionRecord> {
        Box::pin(async move { self.finish_practice_session(session_id, &result).await })
    }

    fn abandon<'a>(&'a self, session_id: &'a str) -> LedgerFuture<'a, ()> {
        Box::pin(async move { self.abandon_practice_session(session_id, Utc::now()).await })
    }
}
