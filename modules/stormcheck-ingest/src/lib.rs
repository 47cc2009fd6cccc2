//! Feed clients, record mappers, and the two polling operations that bring
//! alerts and ground reports into the store.

pub mod alert_feed;
pub mod ingest;
pub mod params;
pub mod report_feed;

pub use alert_feed::AlertFeedClient;
pub use ingest::{AlertPollOutcome, AlertPollStats, Ingestor, ReportPollStats};
pub use report_feed::ReportFeedClient;
