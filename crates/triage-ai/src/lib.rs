//! Classification and routing core for customer inquiry triage.
//!
//! The crate turns free-text customer inquiries into durable routing
//! decisions: text is canonicalized, classified along three axes (category,
//! sentiment, urgency), scored, and assigned to a department and consultant
//! according to declarative rules. Inquiries arrive either through the
//! synchronous [`inquiry::service::TriageService::classify_and_route`] path
//! or through the periodic drain of unprocessed rows in storage.

pub mod config;
pub mod error;
pub mod inquiry;
pub mod storage;
