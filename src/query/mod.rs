//! Search queries: typed parameters, geometry handling and cursor pagination.

pub mod geometry;
pub mod paginator;
pub mod params;

pub use geometry::Geometry;
pub use paginator::{PaginationState, Paginator};
pub use params::{CollectionQuery, DateRange, GranuleQuery, SpatialFilter, SpatialInput};

/// Set `key` to `value`, keeping the position of an existing entry
pub(crate) fn set_param(params: &mut Vec<(String, String)>, key: String, value: String) {
    match params.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 = value,
        None => params.push((key, value)),
    }
}

/// Overlay `overrides` on `base`; later keys win
pub(crate) fn merge_params(
    base: &[(String, String)],
    overrides: impl IntoIterator<Item = (String, String)>,
) -> Vec<(String, String)> {
    let mut merged = base.to_vec();
    for (key, value) in overrides {
        set_param(&mut merged, key, value);
    }
    merged
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn pair(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn merge_overrides_in_place() {
        let base = vec![pair("downloadable", "true"), pair("page_size", "2000")];
        let merged = merge_params(&base, vec![pair("page_size", "10"), pair("concept_id", "C1")]);
        assert_eq!(
            merged,
            vec![
                pair("downloadable", "true"),
                pair("page_size", "10"),
                pair("concept_id", "C1"),
            ]
        );
    }
}
