//! Extraction of hail size and wind speed from warning narrative text.
//!
//! Only storm-warning narratives carry machine-usable magnitude statements,
//! so every other event family yields empty params. A value is only taken
//! when a unit sits next to the number; a bare number never matches. When a
//! narrative states several values for the same kind, the largest wins.

use std::sync::LazyLock;

use regex::Regex;

use stormcheck_common::WarningParams;

/// Hail size statements, in inches. Covers the tag form ("HAIL...1.75IN"),
/// prose with the unit trailing ("hail up to 2 inches"), and prose with the
/// unit leading ("1.75 inch hail").
static HAIL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)hail(?:\s+size)?\s*\.{2,}\s*(\d+(?:\.\d+)?)\s*(?:in\b|inch(?:es)?)")
            .unwrap(),
        Regex::new(
            r"(?i)hail\s+(?:up\s+to\s+|of\s+up\s+to\s+|as\s+large\s+as\s+|to\s+)?(\d+(?:\.\d+)?)\s*(?:in\b|inch(?:es)?)",
        )
        .unwrap(),
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:inch(?:es)?|in\.)(?:\s+diameter)?\s+hail").unwrap(),
    ]
});

/// Wind speed statements, in mph. Covers the tag form ("WIND...60MPH") and
/// both prose orders.
static WIND_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)wind(?:\s+gusts?)?\s*\.{2,}\s*(\d+(?:\.\d+)?)\s*mph").unwrap(),
        Regex::new(
            r"(?i)winds?\s+(?:gusts?\s+)?(?:up\s+to\s+|of\s+up\s+to\s+|in\s+excess\s+of\s+|to\s+)?(\d+(?:\.\d+)?)\s*mph",
        )
        .unwrap(),
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*mph\s+(?:wind|gust)").unwrap(),
    ]
});

/// Pull hail and wind magnitudes out of a warning narrative.
///
/// Misses are preferred over fabrications: a narrative that states a value in
/// an unrecognized phrasing simply yields no reading for that kind.
pub fn extract(narrative: &str, event_category: &str) -> WarningParams {
    if !is_storm_warning_family(event_category) {
        return WarningParams::default();
    }
    WarningParams {
        hail_size_in: max_capture(&HAIL_PATTERNS, narrative),
        wind_speed_mph: max_capture(&WIND_PATTERNS, narrative),
    }
}

/// Event categories whose narratives carry hail and wind tags.
pub fn is_storm_warning_family(event_category: &str) -> bool {
    event_category.to_lowercase().contains("thunderstorm")
}

fn max_capture(patterns: &[Regex], text: &str) -> Option<f64> {
    let mut best: Option<f64> = None;
    for pattern in patterns {
        for caps in pattern.captures_iter(text) {
            let Some(value) = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok()) else {
                continue;
            };
            best = Some(best.map_or(value, |b: f64| b.max(value)));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORM: &str = "Severe Thunderstorm Warning";

    #[test]
    fn extracts_prose_wind_speed() {
        let params = extract("winds up to 50 mph expected", STORM);
        assert_eq!(params.wind_speed_mph, Some(50.0));
        assert_eq!(params.hail_size_in, None);
    }

    #[test]
    fn bare_numbers_never_match() {
        let params = extract("50 people affected", STORM);
        assert!(params.is_empty());
    }

    #[test]
    fn extracts_tag_form() {
        let narrative = "HAZARD...60 mph wind gusts and quarter size hail.\n\
                         WIND...60MPH\n\
                         HAIL...1.00IN";
        let params = extract(narrative, STORM);
        assert_eq!(params.wind_speed_mph, Some(60.0));
        assert_eq!(params.hail_size_in, Some(1.0));
    }

    #[test]
    fn largest_value_wins_per_kind() {
        let narrative =
            "Wind gusts to 60 mph reported earlier. At 4:02 PM, winds up to 70 mph and \
             hail up to 1.75 inches. Previously hail of up to 1 inch was observed.";
        let params = extract(narrative, STORM);
        assert_eq!(params.wind_speed_mph, Some(70.0));
        assert_eq!(params.hail_size_in, Some(1.75));
    }

    #[test]
    fn leading_unit_phrasing() {
        let params = extract("Spotters reported 1.5 inch hail near the interstate.", STORM);
        assert_eq!(params.hail_size_in, Some(1.5));
    }

    #[test]
    fn other_event_families_yield_nothing() {
        let narrative = "WIND...70MPH HAIL...2.00IN";
        assert!(extract(narrative, "Tornado Warning").is_empty());
        assert!(extract(narrative, "Flood Warning").is_empty());
    }

    #[test]
    fn family_gate_is_case_insensitive() {
        let params = extract("WIND...60MPH", "SEVERE THUNDERSTORM WARNING");
        assert_eq!(params.wind_speed_mph, Some(60.0));
    }

    #[test]
    fn state_abbreviation_is_not_an_inch() {
        let params = extract("Large hail in Marion County was reported.", STORM);
        assert_eq!(params.hail_size_in, None);
    }

    #[test]
    fn empty_narrative_yields_nothing() {
        assert!(extract("", STORM).is_empty());
    }
}
