use std::fmt;
use std::num::NonZeroU32;
use std::time::{Duration, Instant, SystemTime};

use zeroize::{Zeroize, ZeroizeOnDrop};

/// The bytes behind a one-time link, tagged with how they should be served.
///
/// Buffers are zeroized when dropped so a burned secret does not linger on
/// the heap.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub enum Payload {
    /// Plain text pasted into the share form.
    Message { bytes: Vec<u8> },
    /// An uploaded file with its original name and MIME type.
    File {
        filename: String,
        content_type: String,
        bytes: Vec<u8>,
    },
}

impl Payload {
    pub fn message(bytes: Vec<u8>) -> Self {
        Self::Message { bytes }
    }

    /// A file payload. An empty content type falls back to
    /// `application/octet-stream`, matching what browsers assume anyway.
    pub fn file(filename: String, content_type: String, bytes: Vec<u8>) -> Self {
        let content_type = if content_type.is_empty() {
            "application/octet-stream".to_owned()
        } else {
            content_type
        };
        Self::File {
            filename,
            content_type,
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Message { bytes } | Self::File { bytes, .. } => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// MIME type to serve the payload under.
    pub fn content_type(&self) -> &str {
        match self {
            Self::Message { .. } => "text/plain; charset=utf-8",
            Self::File { content_type, .. } => content_type,
        }
    }

    /// Original filename for file payloads, `None` for messages.
    pub fn filename(&self) -> Option<&str> {
        match self {
            Self::Message { .. } => None,
            Self::File { filename, .. } => Some(filename),
        }
    }

    /// Move the bytes out, leaving an empty (and trivially zeroized) buffer
    /// behind. Used when writing the payload into a response body so no
    /// second copy of the secret is left to scrub.
    pub fn take_bytes(&mut self) -> Vec<u8> {
        match self {
            Self::Message { bytes } | Self::File { bytes, .. } => std::mem::take(bytes),
        }
    }
}

/// Debug output reports the byte length only; secret bytes never end up in
/// logs or panic messages.
impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message { bytes } => f
                .debug_struct("Message")
                .field("len", &bytes.len())
                .finish(),
            Self::File {
                filename,
                content_type,
                bytes,
            } => f
                .debug_struct("File")
                .field("filename", filename)
                .field("content_type", content_type)
                .field("len", &bytes.len())
                .finish(),
        }
    }
}

/// One stored secret. Only the store mutates these, and only under the
/// per-key map lock: `views` moves forward one consume at a time, and the
/// payload is taken exactly once, on the final view.
pub(crate) struct SecretRecord {
    /// `None` once the view budget is spent; the record is then a
    /// tombstone that only answers "gone".
    pub(crate) payload: Option<Payload>,
    /// Total exposure budget, fixed at creation.
    pub(crate) max_views: NonZeroU32,
    /// Views consumed so far. Never exceeds `max_views`.
    pub(crate) views: u32,
    /// Wall-clock creation time, informational.
    pub(crate) created_at: SystemTime,
    /// Deadline after which the record is evicted wholesale.
    pub(crate) expires_at: Instant,
    /// When the final view was consumed; drives tombstone retention.
    pub(crate) spent_at: Option<Instant>,
}

impl SecretRecord {
    pub(crate) fn new(payload: Payload, max_views: NonZeroU32, ttl: Duration) -> Self {
        Self {
            payload: Some(payload),
            max_views,
            views: 0,
            created_at: SystemTime::now(),
            expires_at: Instant::now() + ttl,
            spent_at: None,
        }
    }

    /// Past its time budget. Expired records are never served, not even as
    /// tombstones.
    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// View budget consumed; the payload is already destroyed.
    pub(crate) fn is_spent(&self) -> bool {
        self.payload.is_none()
    }

    /// Whether the sweeper should drop this record: time-expired, or a
    /// tombstone older than `retention`.
    pub(crate) fn should_purge(&self, now: Instant, retention: Duration) -> bool {
        if self.is_expired(now) {
            return true;
        }
        self.is_spent()
            && self
                .spent_at
                .is_some_and(|spent| now.saturating_duration_since(spent) >= retention)
    }

    pub(crate) fn meta(&self, now: Instant) -> SecretMeta {
        SecretMeta {
            max_views: self.max_views.get(),
            views: self.views,
            expires_in: self.expires_at.saturating_duration_since(now),
            created_at: self.created_at,
        }
    }
}

/// Counters and deadlines for a record, without the payload. Snapshotted
/// under the same lock the consume path uses; reading one never charges a
/// view.
#[derive(Debug, Clone, Copy)]
pub struct SecretMeta {
    pub max_views: u32,
    pub views: u32,
    /// Remaining time budget at snapshot time (zero once expired).
    pub expires_in: Duration,
    pub created_at: SystemTime,
}

impl SecretMeta {
    pub fn is_spent(&self) -> bool {
        self.views >= self.max_views
    }

    pub fn views_left(&self) -> u32 {
        self.max_views.saturating_sub(self.views)
    }
}

/// Snapshot handed out by a successful consume: the payload plus the
/// counters exactly as they stood after this view was charged, so the
/// caller can tell whether it got the last one.
#[derive(Debug)]
pub struct SecretView {
    pub payload: Payload,
    /// Consumed count including this view.
    pub views: u32,
    pub max_views: u32,
    /// Remaining time budget at consume time.
    pub expires_in: Duration,
}

impl SecretView {
    pub fn views_left(&self) -> u32 {
        self.max_views.saturating_sub(self.views)
    }
}

/// Outcome of a consume. Running out of budget is a normal answer here,
/// not an error.
#[derive(Debug)]
pub enum ConsumeResult {
    /// View charged and payload delivered; the record still has views left.
    Viewed(SecretView),
    /// View charged and payload delivered for the last time; the stored
    /// payload was destroyed in the same step.
    Burned(SecretView),
    /// The view budget was already spent (payload destroyed earlier).
    Spent,
    /// No such id, or the record was past its time budget (and is gone now).
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    #[test]
    fn message_content_type_is_plain_text() {
        let p = Payload::message(b"hello".to_vec());
        assert_eq!(p.content_type(), "text/plain; charset=utf-8");
        assert_eq!(p.filename(), None);
    }

    #[test]
    fn file_without_content_type_falls_back_to_octet_stream() {
        let p = Payload::file("x.bin".into(), String::new(), vec![1, 2, 3]);
        assert_eq!(p.content_type(), "application/octet-stream");
        assert_eq!(p.filename(), Some("x.bin"));
    }

    #[test]
    fn take_bytes_leaves_nothing_behind() {
        let mut p = Payload::message(b"secret".to_vec());
        let bytes = p.take_bytes();
        assert_eq!(bytes, b"secret");
        assert!(p.is_empty());
    }

    #[test]
    fn debug_never_prints_payload_bytes() {
        let p = Payload::message(b"super secret".to_vec());
        let dump = format!("{p:?}");
        assert!(!dump.contains("super secret"));
        assert!(dump.contains("len"));
    }

    #[test]
    fn zero_ttl_record_is_expired_immediately() {
        let r = SecretRecord::new(Payload::message(b"x".to_vec()), budget(1), Duration::ZERO);
        assert!(r.is_expired(Instant::now()));
    }

    #[test]
    fn fresh_record_is_live() {
        let r = SecretRecord::new(
            Payload::message(b"x".to_vec()),
            budget(2),
            Duration::from_secs(60),
        );
        let now = Instant::now();
        assert!(!r.is_expired(now));
        assert!(!r.is_spent());
        assert!(!r.should_purge(now, Duration::ZERO));
    }

    #[test]
    fn stale_tombstone_is_purgeable() {
        let mut r = SecretRecord::new(
            Payload::message(b"x".to_vec()),
            budget(1),
            Duration::from_secs(60),
        );
        let now = Instant::now();
        r.payload = None;
        r.views = 1;
        r.spent_at = Some(now);
        assert!(r.is_spent());
        // Zero retention: purgeable right away.
        assert!(r.should_purge(now, Duration::ZERO));
        // Generous retention: kept so it can still answer "gone".
        assert!(!r.should_purge(now, Duration::from_secs(3600)));
    }

    #[test]
    fn meta_counts_match_record() {
        let r = SecretRecord::new(
            Payload::message(b"x".to_vec()),
            budget(3),
            Duration::from_secs(60),
        );
        let meta = r.meta(Instant::now());
        assert_eq!(meta.max_views, 3);
        assert_eq!(meta.views, 0);
        assert_eq!(meta.views_left(), 3);
        assert!(!meta.is_spent());
        assert!(meta.expires_in <= Duration::from_secs(60));
        assert!(meta.expires_in > Duration::from_secs(50));
    }
}
