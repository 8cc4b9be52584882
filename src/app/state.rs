use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::app::model::{ContentStatus, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A worker takes the document.
    Claim,
    /// The converter produced usable Markdown.
    Complete,
    /// Conversion failed for this attempt.
    Fail,
    /// An operator or audit sends the document back to the pool.
    Requeue,
    /// The watchdog found an abandoned claim.
    ResetStale,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal transition: {event:?} from {from}")]
pub struct TransitionError {
    pub from: ContentStatus,
    pub event: Event,
}

/// The only legal edges of the extraction lifecycle.
///
/// `Complete` is accepted from every state: racing or slow workers resolve
/// as last-writer-wins because content writes replace, never append.
pub fn next_status(from: ContentStatus, event: Event) -> Result<ContentStatus, TransitionError> {
    use ContentStatus::*;

    let to = match (from, event) {
        (Pending | Failed, Event::Claim) => Extracting,
        (_, Event::Complete) => Extracted,
        (Extracting, Event::Fail) => Failed,
        (Extracted | Failed, Event::Requeue) => Pending,
        (Extracting, Event::ResetStale) => Pending,
        _ => return Err(TransitionError { from, event }),
    };
    Ok(to)
}

/// Applies `event` to `document`, updating the bookkeeping fields that go
/// with the edge. The caller persists the result.
pub fn apply(
    document: &mut Document,
    event: Event,
    now: DateTime<Utc>,
) -> Result<(), TransitionError> {
    let to = next_status(document.content_status, event)?;
    match event {
        Event::Claim => {
            document.claimed_at = Some(now);
            document.attempts = document.attempts.saturating_add(1);
        }
        Event::Complete => {
            document.error_message = None;
            document.extracted_at = Some(now);
            document.claimed_at = None;
        }
        Event::Fail => {
            document.claimed_at = None;
        }
        Event::Requeue => {
            document.attempts = 0;
            document.claimed_at = None;
            document.error_message = None;
        }
        Event::ResetStale => {
            document.claimed_at = None;
        }
    }
    document.content_status = to;
    document.updated_at = now;
    Ok(())
}

/// Decides when a `failed` document may be claimed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Wait required after the given number of attempts (doubling).
    pub fn backoff_after(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(16);
        self.backoff.saturating_mul(1u32 << exponent)
    }

    pub fn is_claimable(&self, document: &Document, now: DateTime<Utc>) -> bool {
        match document.content_status {
            ContentStatus::Pending => true,
            ContentStatus::Failed => {
                if document.attempts >= self.max_attempts {
                    return false;
                }
                let waited = (now - document.updated_at).to_std().unwrap_or(Duration::ZERO);
                waited >= self.backoff_after(document.attempts)
            }
            ContentStatus::Extracting | ContentStatus::Extracted => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;

    fn doc(status: ContentStatus) -> Document {
        let mut doc = Document::new("m1", 2021, "Ford", "F-150", "f150.pdf").unwrap();
        doc.content_status = status;
        doc
    }

    #[test]
    fn legal_edges() {
        use ContentStatus::*;
        assert_eq!(next_status(Pending, Event::Claim), Ok(Extracting));
        assert_eq!(next_status(Failed, Event::Claim), Ok(Extracting));
        assert_eq!(next_status(Extracting, Event::Complete), Ok(Extracted));
        assert_eq!(next_status(Extracted, Event::Complete), Ok(Extracted));
        assert_eq!(next_status(Extracting, Event::Fail), Ok(Failed));
        assert_eq!(next_status(Extracted, Event::Requeue), Ok(Pending));
        assert_eq!(next_status(Failed, Event::Requeue), Ok(Pending));
        assert_eq!(next_status(Extracting, Event::ResetStale), Ok(Pending));
    }

    #[test]
    fn illegal_edges() {
        use ContentStatus::*;
        for (from, event) in [
            (Extracting, Event::Claim),
            (Extracted, Event::Claim),
            (Pending, Event::Fail),
            (Extracted, Event::Fail),
            (Pending, Event::Requeue),
            (Extracting, Event::Requeue),
            (Pending, Event::ResetStale),
            (Failed, Event::ResetStale),
        ] {
            let err = next_status(from, event).unwrap_err();
            assert_eq!(err, TransitionError { from, event });
        }
    }

    #[test]
    fn claim_stamps_and_counts() {
        let now = Utc::now();
        let mut doc = doc(ContentStatus::Pending);
        apply(&mut doc, Event::Claim, now).unwrap();
        assert_eq!(doc.content_status, ContentStatus::Extracting);
        assert_eq!(doc.claimed_at, Some(now));
        assert_eq!(doc.attempts, 1);
        assert_eq!(doc.updated_at, now);
    }

    #[test]
    fn complete_clears_error() {
        let now = Utc::now();
        let mut doc = doc(ContentStatus::Extracting);
        doc.error_message = Some("conversion failed".to_owned());
        apply(&mut doc, Event::Complete, now).unwrap();
        assert_eq!(doc.error_message, None);
        assert_eq!(doc.extracted_at, Some(now));
    }

    #[test]
    fn requeue_resets_attempts() {
        let mut doc = doc(ContentStatus::Failed);
        doc.attempts = 3;
        apply(&mut doc, Event::Requeue, Utc::now()).unwrap();
        assert_eq!(doc.content_status, ContentStatus::Pending);
        assert_eq!(doc.attempts, 0);
    }

    #[test]
    fn rejected_event_leaves_document_untouched() {
        let mut doc = doc(ContentStatus::Extracted);
        let before = doc.clone();
        assert!(apply(&mut doc, Event::Fail, Utc::now()).is_err());
        assert_eq!(doc, before);
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff: Duration::from_secs(60),
        };
        assert_eq!(policy.backoff_after(0), Duration::from_secs(60));
        assert_eq!(policy.backoff_after(1), Duration::from_secs(60));
        assert_eq!(policy.backoff_after(2), Duration::from_secs(120));
        assert_eq!(policy.backoff_after(3), Duration::from_secs(240));
    }

    #[test]
    fn failed_documents_wait_and_give_up() {
        let policy = RetryPolicy::default();
        let now = Utc::now();

        let mut recent = doc(ContentStatus::Failed);
        recent.attempts = 1;
        recent.updated_at = now - ChronoDuration::seconds(10);
        assert!(!policy.is_claimable(&recent, now));

        let mut waited = recent.clone();
        waited.updated_at = now - ChronoDuration::minutes(6);
        assert!(policy.is_claimable(&waited, now));

        let mut exhausted = waited.clone();
        exhausted.attempts = policy.max_attempts;
        assert!(!policy.is_claimable(&exhausted, now));

        assert!(policy.is_claimable(&doc(ContentStatus::Pending), now));
        assert!(!policy.is_claimable(&doc(ContentStatus::Extracting), now));
    }
}
