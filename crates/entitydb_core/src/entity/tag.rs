//! Temporal tags: `<nanos>|<body>`.
//!
//! spec §3 invariant 1: every tag in storage is temporally prefixed; raw
//! tags appear only on ingress and are normalized before persistence (see
//! [`Tag::normalize`]).

use crate::error::{CoreError, CoreResult};

/// Maximum length, in bytes, of a persisted tag (including the `nanos|`
/// prefix). Mirrors `entitydb_codec::MAX_TAG_LEN`.
pub const MAX_TAG_LEN: usize = entitydb_codec::MAX_TAG_LEN;

/// A handful of reserved tag-body prefixes get an enum so the hot paths
/// (security primitives, relationship view) can match instead of
/// re-parsing strings. Any other prefix is just an opaque string body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedPrefix {
    /// `type:` — entity kind discriminator (`user`, `credential`, `session`,
    /// `relationship`, ...).
    Type,
    /// `identity:` — login identifiers (`identity:username:<u>`).
    Identity,
    /// `status:` — lifecycle state (`status:active`, `status:todo`, ...).
    Status,
    /// `rbac:` — role assignment (`rbac:role:<r>`).
    Rbac,
    /// `_source:` — relationship source entity ID.
    Source,
    /// `_target:` — relationship target entity ID.
    Target,
    /// `_relationship:` — relationship kind.
    Relationship,
    /// `dataset:` — dataset/namespace partitioning.
    Dataset,
}

impl ReservedPrefix {
    /// The literal prefix string, including trailing `:`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Type => "type:",
            Self::Identity => "identity:",
            Self::Status => "status:",
            Self::Rbac => "rbac:",
            Self::Source => "_source:",
            Self::Target => "_target:",
            Self::Relationship => "_relationship:",
            Self::Dataset => "dataset:",
        }
    }

    /// Classifies a tag body's prefix, if it matches a reserved one.
    #[must_use]
    pub fn classify(body: &str) -> Option<Self> {
        const ALL: &[ReservedPrefix] = &[
            ReservedPrefix::Type,
            ReservedPrefix::Identity,
            ReservedPrefix::Status,
            ReservedPrefix::Rbac,
            ReservedPrefix::Source,
            ReservedPrefix::Target,
            ReservedPrefix::Relationship,
            ReservedPrefix::Dataset,
        ];
        ALL.iter().find(|p| body.starts_with(p.as_str())).copied()
    }
}

/// A tag in its persisted temporal form: a nanosecond timestamp plus an
/// arbitrary body (conventionally `namespace:key:value`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Monotonic wall-clock nanosecond of insertion.
    pub nanos: i64,
    /// The tag body (everything after `nanos|`).
    pub body: String,
}

impl Tag {
    /// Builds a tag with an explicit timestamp.
    #[must_use]
    pub fn new(nanos: i64, body: impl Into<String>) -> Self {
        Self {
            nanos,
            body: body.into(),
        }
    }

    /// Formats this tag into its persisted `"<nanos>|<body>"` form.
    #[must_use]
    pub fn to_persisted(&self) -> String {
        format!("{}|{}", self.nanos, self.body)
    }

    /// Parses a persisted `"<nanos>|<body>"` string.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Corrupt`] if the `|` separator is missing or
    /// the prefix is not a valid integer.
    pub fn from_persisted(raw: &str) -> CoreResult<Self> {
        let (nanos_str, body) = raw
            .split_once('|')
            .ok_or_else(|| CoreError::corrupt("tag", format!("missing '|' separator in {raw:?}")))?;
        let nanos = nanos_str
            .parse::<i64>()
            .map_err(|_| CoreError::corrupt("tag", format!("non-numeric nanos prefix in {raw:?}")))?;
        Ok(Self {
            nanos,
            body: body.to_string(),
        })
    }

    /// Normalizes a raw, caller-supplied tag into persisted temporal form.
    ///
    /// If `raw` already looks like `"<nanos>|<body>"` (a numeric prefix
    /// followed by `|`), it is taken as already-normalized input and
    /// passed through unchanged — this keeps `Update` idempotent when it
    /// replays a full entity snapshot that already carries persisted tags.
    /// Otherwise `now` is used as the insertion timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Invalid`] if the resulting body exceeds
    /// [`MAX_TAG_LEN`].
    pub fn normalize(raw: &str, now: i64) -> CoreResult<Self> {
        let tag = if let Some((prefix, body)) = raw.split_once('|') {
            if let Ok(nanos) = prefix.parse::<i64>() {
                Self::new(nanos, body)
            } else {
                Self::new(now, raw)
            }
        } else {
            Self::new(now, raw)
        };

        if tag.to_persisted().len() > MAX_TAG_LEN {
            return Err(CoreError::invalid(format!(
                "tag exceeds {MAX_TAG_LEN} bytes"
            )));
        }
        Ok(tag)
    }

    /// Returns the reserved-prefix classification of this tag's body, if any.
    #[must_use]
    pub fn reserved_prefix(&self) -> Option<ReservedPrefix> {
        ReservedPrefix::classify(&self.body)
    }

    /// Builds a removal marker for `body`, persisted at `nanos`.
    ///
    /// spec §3 derived view: a body is current only "iff ... no later
    /// record marks it removed". `Update` emits one of these for every
    /// previously-current body the new snapshot doesn't repeat, so the
    /// body index can hide it while the temporal history keeps it intact.
    /// The marker is a tag like any other on disk — a leading sentinel
    /// byte that can't occur in ordinary UTF-8 tag text — so it
    /// round-trips through `to_persisted`/`from_persisted` unchanged.
    #[must_use]
    pub fn removal_marker(nanos: i64, body: &str) -> Self {
        Self::new(nanos, format!("{REMOVAL_MARKER_SIGIL}{body}"))
    }

    /// Returns `true` if this tag is a [`Tag::removal_marker`].
    #[must_use]
    pub fn is_removal_marker(&self) -> bool {
        self.body.starts_with(REMOVAL_MARKER_SIGIL)
    }

    /// The body a removal marker refers to, stripped of its sigil. Equal
    /// to `&self.body` for an ordinary (non-marker) tag.
    #[must_use]
    pub fn marked_body(&self) -> &str {
        self.body.strip_prefix(REMOVAL_MARKER_SIGIL).unwrap_or(&self.body)
    }
}

/// Sentinel prefix identifying a removal marker. A NUL byte can't appear
/// in caller-supplied tag text that round-trips through any reasonable
/// text encoding, so this never collides with an ordinary body.
const REMOVAL_MARKER_SIGIL: char = '\u{0}';
