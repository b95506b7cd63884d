// ── W3C trace context ──
//
// Outbound commands and discovery requests carry a `traceparent` header
// (`00-<trace-id>-<span-id>-01`) so server-side spans join the caller's
// trace. Ids are minted from v4 UUID randomness.

use std::fmt;

use uuid::Uuid;

pub const TRACEPARENT_HEADER: &str = "traceparent";

const VERSION: &str = "00";
const FLAGS_SAMPLED: &str = "01";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceParent {
    trace_id: String,
    span_id: String,
}

impl TraceParent {
    /// Start a new trace with a fresh root span.
    pub fn mint() -> Self {
        Self {
            trace_id: Uuid::new_v4().simple().to_string(),
            span_id: new_span_id(),
        }
    }

    /// A new span within the same trace.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: new_span_id(),
        }
    }

    /// 32 lowercase hex characters.
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// 16 lowercase hex characters.
    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    pub fn to_header(&self) -> String {
        self.to_string()
    }
}

fn new_span_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

impl fmt::Display for TraceParent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{VERSION}-{}-{}-{FLAGS_SAMPLED}",
            self.trace_id, self.span_id
        )
    }
}
