use std::cmp::Ordering;

use base64::{engine::general_purpose::URL_SAFE, Engine};
use chrono::{DateTime, SecondsFormat, Utc};
use getset::{CopyGetters, Getters};

use crate::{utils, SandplaneError, SandplaneResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const CURSOR_SEPARATOR: &str = "__";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The listing position of the last item of a page.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct Cursor {
    /// The item's start time.
    #[getset(get_copy = "pub with_prefix")]
    timestamp: DateTime<Utc>,

    /// The item's sandbox id.
    #[getset(get = "pub with_prefix")]
    sandbox_id: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Cursor {
    /// Creates a cursor at the given position.
    pub fn new(timestamp: DateTime<Utc>, sandbox_id: impl Into<String>) -> Self {
        Self {
            timestamp: utils::truncate_micros(timestamp),
            sandbox_id: sandbox_id.into(),
        }
    }

    /// Encodes the cursor as an opaque, URL-safe token.
    pub fn encode(&self) -> String {
        let raw = format!(
            "{}{CURSOR_SEPARATOR}{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.sandbox_id
        );
        URL_SAFE.encode(raw)
    }

    /// Decodes a token produced by [`Cursor::encode`].
    pub fn decode(token: &str) -> SandplaneResult<Self> {
        let invalid = || SandplaneError::InvalidArgument("invalid next token".to_string());

        let bytes = URL_SAFE.decode(token.trim()).map_err(|_| invalid())?;
        let raw = String::from_utf8(bytes).map_err(|_| invalid())?;
        let (timestamp, sandbox_id) = raw.split_once(CURSOR_SEPARATOR).ok_or_else(invalid)?;
        if sandbox_id.is_empty() {
            return Err(invalid());
        }

        let timestamp = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|_| invalid())?
            .with_timezone(&Utc);

        Ok(Self::new(timestamp, sandbox_id))
    }

    /// Whether an item at `(started_at, sandbox_id)` comes strictly after the cursor.
    pub fn admits(&self, started_at: DateTime<Utc>, sandbox_id: &str) -> bool {
        started_at < self.timestamp
            || (started_at == self.timestamp && sandbox_id > self.sandbox_id.as_str())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// The listing order: newest start time first, then sandbox id ascending.
pub fn listing_order(
    a: (DateTime<Utc>, &str),
    b: (DateTime<Utc>, &str),
) -> Ordering {
    b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
