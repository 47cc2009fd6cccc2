//! Event family to report category mapping.

use stormcheck_common::ReportCategory;

/// Report families that can corroborate a given alert event.
///
/// The table is deliberately narrow. An event with no entry yields an empty
/// slice and the engine marks the alert verification-failed instead of
/// matching it against every report family.
pub fn expected_categories(event: &str) -> &'static [ReportCategory] {
    let event = event.to_lowercase();
    if event.contains("tornado") {
        &[ReportCategory::Tornado]
    } else if event.contains("thunderstorm") {
        &[ReportCategory::Wind, ReportCategory::Hail]
    } else if event.contains("wind") {
        &[ReportCategory::Wind]
    } else {
        &[]
    }
}
