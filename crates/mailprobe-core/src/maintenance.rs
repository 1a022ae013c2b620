//! Mailbox housekeeping outside of probe runs.

use mailprobe_mime::Message;
use serde::Serialize;

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::mailbox::{MailboxConnector, MailboxSession};

/// Header summary of one stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSummary {
    /// Message number within the session.
    pub number: u32,
    /// Decoded subject.
    pub subject: Option<String>,
    /// Decoded `From` header.
    pub from: Option<String>,
    /// `Date` header.
    pub date: Option<String>,
    /// Size reported by the listing.
    pub size: u64,
}

/// Deletes every message in the endpoint's mailbox, returning how many.
///
/// Each message is retrieved before it is deleted, except those listed as
/// larger than `max_message_size`, which are deleted unread.
///
/// # Errors
///
/// Returns the first connection or mailbox error; nothing is committed then.
pub async fn purge_mailbox<C>(
    connector: &C,
    endpoint: &Endpoint,
    max_message_size: u64,
) -> Result<usize>
where
    C: MailboxConnector,
{
    let mut session = connector.connect(endpoint).await?;

    let result = async {
        let entries = session.list().await?;
        for entry in &entries {
            if entry.size <= max_message_size {
                session.retrieve(entry.number).await?;
            }
            session.delete(entry.number).await?;
            tracing::debug!(endpoint = %endpoint.id, number = entry.number, "message purged");
        }
        Ok(entries.len())
    }
    .await;

    let purged = finish(session, endpoint, result).await?;
    tracing::info!(endpoint = %endpoint.id, purged, "mailbox purged");
    Ok(purged)
}

/// Summarizes every message in the endpoint's mailbox without deleting.
///
/// Messages listed as larger than `max_message_size` are not retrieved;
/// their summary carries only the number and size.
///
/// # Errors
///
/// Returns the first connection or mailbox error.
pub async fn dump_mailbox<C>(
    connector: &C,
    endpoint: &Endpoint,
    max_message_size: u64,
) -> Result<Vec<MessageSummary>>
where
    C: MailboxConnector,
{
    let mut session = connector.connect(endpoint).await?;

    let result = async {
        let entries = session.list().await?;
        let mut summaries = Vec::with_capacity(entries.len());
        for entry in entries {
            let unread = MessageSummary {
                number: entry.number,
                subject: None,
                from: None,
                date: None,
                size: entry.size,
            };
            if entry.size > max_message_size {
                tracing::warn!(
                    endpoint = %endpoint.id,
                    number = entry.number,
                    size = entry.size,
                    "oversized message not retrieved"
                );
                summaries.push(unread);
                continue;
            }

            let raw = session.retrieve(entry.number).await?;
            let summary = match Message::parse(&raw) {
                Ok(message) => MessageSummary {
                    subject: message.subject(),
                    from: message.from(),
                    date: message.date().map(str::to_string),
                    ..unread
                },
                Err(error) => {
                    tracing::warn!(
                        endpoint = %endpoint.id,
                        number = entry.number,
                        %error,
                        "unparseable message"
                    );
                    unread
                }
            };
            tracing::info!(
                endpoint = %endpoint.id,
                number = summary.number,
                subject = summary.subject.as_deref().unwrap_or(""),
                from = summary.from.as_deref().unwrap_or(""),
                size = summary.size,
                "message"
            );
            summaries.push(summary);
        }
        Ok(summaries)
    }
    .await;

    finish(session, endpoint, result).await
}

async fn finish<S, T>(session: S, endpoint: &Endpoint, result: Result<T>) -> Result<T>
where
    S: MailboxSession,
{
    match result {
        Ok(value) => {
            session.quit().await?;
            Ok(value)
        }
        Err(error) => {
            if let Err(quit_error) = session.quit().await {
                tracing::warn!(
                    endpoint = %endpoint.id,
                    %quit_error,
                    "QUIT after failure also failed"
                );
            }
            Err(error)
        }
    }
}
