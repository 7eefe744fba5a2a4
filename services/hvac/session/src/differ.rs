//! Status differ.
//!
//! Compares a decoded `code -> raw` snapshot with what a device reported last
//! and keeps only the described properties whose raw value moved.

use crate::events::{PropertyChange, PropertyChanges};
use hvac_wire::Property;
use std::collections::BTreeMap;
use tracing::debug;

/// Properties whose raw value differs from `previous`.
///
/// Codes never seen before count as changed. Codes without a descriptor are
/// logged and skipped.
pub fn diff(previous: &BTreeMap<String, i64>, current: &[(String, i64)]) -> PropertyChanges {
    current
        .iter()
        .filter(|(code, raw)| previous.get(code) != Some(raw))
        .filter_map(|(code, raw)| describe(code, *raw))
        .collect()
}

/// Every described property in `current`, changed or not
pub fn report(current: &[(String, i64)]) -> PropertyChanges {
    current
        .iter()
        .filter_map(|(code, raw)| describe(code, *raw))
        .collect()
}

fn describe(code: &str, raw: i64) -> Option<(Property, PropertyChange)> {
    match Property::from_code(code) {
        Some(property) => Some((property, PropertyChange::new(property, raw))),
        None => {
            debug!("Unknown property code {}: {}", code, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(pairs: &[(&str, i64)]) -> Vec<(String, i64)> {
        pairs.iter().map(|(c, v)| (c.to_string(), *v)).collect()
    }

    fn state(pairs: &[(&str, i64)]) -> BTreeMap<String, i64> {
        columns(pairs).into_iter().collect()
    }

    #[test]
    fn test_single_property_change() {
        let previous = state(&[("Pow", 0), ("Mod", 1), ("SetTem", 24), ("WdSpd", 0)]);
        let current = columns(&[("Pow", 1), ("Mod", 1), ("SetTem", 24), ("WdSpd", 0)]);

        let changes = diff(&previous, &current);
        assert_eq!(changes.len(), 1);
        assert_eq!(
            changes[&Property::Power],
            PropertyChange {
                raw: 1,
                symbolic: Some("on")
            }
        );
    }

    #[test]
    fn test_first_snapshot_reports_everything() {
        let current = columns(&[("Mod", 4), ("SetTem", 21)]);
        let changes = diff(&BTreeMap::new(), &current);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[&Property::Mode].symbolic, Some("heat"));
        assert_eq!(changes[&Property::Temperature].symbolic, None);
        assert_eq!(changes[&Property::Temperature].raw, 21);
    }

    #[test]
    fn test_unknown_codes_are_skipped() {
        let current = columns(&[("TemSen", 62), ("Pow", 1)]);
        let changes = diff(&BTreeMap::new(), &current);
        assert_eq!(changes.keys().copied().collect::<Vec<_>>(), vec![Property::Power]);
    }

    #[test]
    fn test_report_includes_unchanged() {
        let current = columns(&[("Tur", 1), ("Quiet", 0)]);
        let changes = report(&current);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[&Property::Quiet].symbolic, Some("off"));
    }
}
