use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod action;
pub mod health;
pub mod sse;
pub mod validation;
pub mod view;

/// Format an epoch-millis timestamp as RFC 3339. Out-of-range values yield `None`.
fn format_epoch_millis(millis: i64) -> Option<String> {
    let nanos = i128::from(millis) * 1_000_000;
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()?
        .format(&Rfc3339)
        .ok()
}
