//! Filter / sort / paginate projection of the activation table.
//!
//! Everything here is a pure function of `(rows, TableView)`; the view only
//! carries configuration.

use std::cmp::Ordering;

use crate::model::ActivationRow;

pub const PAGE_SIZE_OPTIONS: [usize; 4] = [10, 20, 50, 100];
pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    Layer,
    TokenIdx,
    Token,
    #[default]
    ActivationScore,
    ClusterId,
}

impl SortField {
    pub fn label(self) -> &'static str {
        match self {
            SortField::Layer => "layer",
            SortField::TokenIdx => "token_idx",
            SortField::Token => "token",
            SortField::ActivationScore => "activation_score",
            SortField::ClusterId => "cluster_id",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|f| f.label() == s.trim())
    }

    pub fn all() -> &'static [SortField] {
        &[
            SortField::Layer,
            SortField::TokenIdx,
            SortField::Token,
            SortField::ActivationScore,
            SortField::ClusterId,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableView {
    pub filter: String,
    pub sort_field: SortField,
    pub direction: SortDirection,
    pub page_size: usize,
    pub page: usize,
}

impl Default for TableView {
    fn default() -> Self {
        Self {
            filter: String::new(),
            sort_field: SortField::default(),
            direction: SortDirection::default(),
            page_size: DEFAULT_PAGE_SIZE,
            page: 0,
        }
    }
}

impl TableView {
    pub fn set_filter(&mut self, filter: impl Into<String>) {
        self.filter = filter.into();
        self.page = 0;
    }

    /// Same field flips the direction; a new field starts descending.
    pub fn toggle_sort(&mut self, field: SortField) {
        if field == self.sort_field {
            self.direction = self.direction.flipped();
        } else {
            self.sort_field = field;
            self.direction = SortDirection::Desc;
        }
        self.page = 0;
    }

    pub fn set_page_size(&mut self, size: usize) {
        self.page_size = size.max(1);
        self.page = 0;
    }

    pub fn next_page(&mut self, row_count: usize) {
        let pages = total_pages(row_count, self.page_size);
        if self.page + 1 < pages {
            self.page += 1;
        }
    }

    pub fn prev_page(&mut self) {
        self.page = self.page.saturating_sub(1);
    }

    /// Clamp the page index into `[0, pages)` (or 0 when there are no rows).
    pub fn clamp_page(&mut self, row_count: usize) {
        self.page = clamped_page(self.page, row_count, self.page_size);
    }
}

fn clamped_page(page: usize, row_count: usize, page_size: usize) -> usize {
    page.min(total_pages(row_count, page_size).saturating_sub(1))
}

pub fn total_pages(row_count: usize, page_size: usize) -> usize {
    row_count.div_ceil(page_size.max(1))
}

/// Rows whose token, layer or cluster id contains `filter` (case-insensitive).
pub fn filter_rows<'a>(rows: &'a [ActivationRow], filter: &str) -> Vec<&'a ActivationRow> {
    let needle = filter.to_lowercase();
    if needle.is_empty() {
        return rows.iter().collect();
    }
    rows.iter().filter(|r| row_matches(r, &needle)).collect()
}

fn row_matches(row: &ActivationRow, needle: &str) -> bool {
    row.token.to_lowercase().contains(needle)
        || row.layer.to_string().contains(needle)
        || row
            .cluster_id
            .map(|c| c.to_string().contains(needle))
            .unwrap_or(false)
}

/// Stable sort. Absent numeric values go last in either direction.
pub fn sort_rows(rows: &mut [&ActivationRow], field: SortField, direction: SortDirection) {
    rows.sort_by(|a, b| compare_rows(a, b, field, direction));
}

fn compare_rows(
    a: &ActivationRow,
    b: &ActivationRow,
    field: SortField,
    direction: SortDirection,
) -> Ordering {
    let directed = |o: Ordering| match direction {
        SortDirection::Asc => o,
        SortDirection::Desc => o.reverse(),
    };

    match field {
        SortField::Layer => directed(a.layer.cmp(&b.layer)),
        SortField::TokenIdx => directed(a.token_idx.cmp(&b.token_idx)),
        SortField::Token => directed(a.token.cmp(&b.token)),
        SortField::ActivationScore => {
            compare_optional(a.activation_score, b.activation_score, |x, y| {
                directed(x.total_cmp(&y))
            })
        }
        SortField::ClusterId => {
            compare_optional(a.cluster_id, b.cluster_id, |x, y| directed(x.cmp(&y)))
        }
    }
}

fn compare_optional<T: Copy>(
    a: Option<T>,
    b: Option<T>,
    cmp: impl Fn(T, T) -> Ordering,
) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => cmp(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// One rendered page plus the counts needed for pagination controls.
#[derive(Debug, Clone, PartialEq)]
pub struct TablePage<'a> {
    pub rows: Vec<&'a ActivationRow>,
    pub page: usize,
    pub total_pages: usize,
    pub matching_rows: usize,
}

/// Filtered and sorted rows, before pagination.
pub fn filtered_sorted<'a>(rows: &'a [ActivationRow], view: &TableView) -> Vec<&'a ActivationRow> {
    let mut out = filter_rows(rows, &view.filter);
    sort_rows(&mut out, view.sort_field, view.direction);
    out
}

pub fn project<'a>(rows: &'a [ActivationRow], view: &TableView) -> TablePage<'a> {
    let all = filtered_sorted(rows, view);
    let matching_rows = all.len();
    let size = view.page_size.max(1);
    let page = clamped_page(view.page, matching_rows, size);
    let start = (page * size).min(matching_rows);
    let end = (start + size).min(matching_rows);

    TablePage {
        rows: all[start..end].to_vec(),
        page,
        total_pages: total_pages(matching_rows, size),
        matching_rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(layer: i64, idx: u32, token: &str, score: Option<f64>, cluster: Option<i64>) -> ActivationRow {
        ActivationRow {
            layer,
            token_idx: idx,
            token: token.to_string(),
            activation_score: score,
            cluster_id: cluster,
        }
    }

    fn sample() -> Vec<ActivationRow> {
        vec![
            row(0, 0, "She", Some(0.2), Some(1)),
            row(4, 3, "doctor", Some(0.9), Some(2)),
            row(11, 1, "is", None, None),
            row(4, 2, "a", Some(0.9), Some(12)),
            row(7, 3, "Doctor", Some(-0.5), Some(3)),
        ]
    }

    #[test]
    fn empty_filter_keeps_everything_in_order() {
        let rows = sample();
        let got = filter_rows(&rows, "");
        assert_eq!(got.len(), rows.len());
        for (g, r) in got.iter().zip(rows.iter()) {
            assert!(std::ptr::eq(*g, r));
        }
    }

    #[test]
    fn filter_matches_token_layer_or_cluster_case_insensitively() {
        let rows = sample();

        let tokens: Vec<&str> = filter_rows(&rows, "DOC").iter().map(|r| r.token.as_str()).collect();
        assert_eq!(tokens, vec!["doctor", "Doctor"]);

        // "1" hits layer 11, cluster 1 and cluster 12.
        let tokens: Vec<&str> = filter_rows(&rows, "1").iter().map(|r| r.token.as_str()).collect();
        assert_eq!(tokens, vec!["She", "is", "a"]);

        // Layer 0 is matched as text like any other layer.
        assert_eq!(filter_rows(&rows, "0").len(), 1);
    }

    #[test]
    fn filter_is_exact_predicate_for_arbitrary_needles() {
        let rows = sample();
        for needle in ["", "d", "o", "4", "12", "s", "zz", "A"] {
            let got = filter_rows(&rows, needle);
            let lower = needle.to_lowercase();
            let expected: Vec<&ActivationRow> = rows
                .iter()
                .filter(|r| {
                    r.token.to_lowercase().contains(&lower)
                        || r.layer.to_string().contains(&lower)
                        || r.cluster_id.map(|c| c.to_string().contains(&lower)).unwrap_or(false)
                })
                .collect();
            assert_eq!(got, expected, "needle {needle:?}");
        }
    }

    #[test]
    fn numeric_sort_desc_is_stable_and_puts_missing_last() {
        let rows = sample();
        let mut v: Vec<&ActivationRow> = rows.iter().collect();
        sort_rows(&mut v, SortField::ActivationScore, SortDirection::Desc);
        let tokens: Vec<&str> = v.iter().map(|r| r.token.as_str()).collect();
        // The two 0.9 rows keep their input order.
        assert_eq!(tokens, vec!["doctor", "a", "She", "Doctor", "is"]);

        sort_rows(&mut v, SortField::ActivationScore, SortDirection::Asc);
        let tokens: Vec<&str> = v.iter().map(|r| r.token.as_str()).collect();
        assert_eq!(tokens, vec!["Doctor", "She", "doctor", "a", "is"]);
    }

    #[test]
    fn token_sort_is_case_sensitive() {
        let rows = sample();
        let mut v: Vec<&ActivationRow> = rows.iter().collect();
        sort_rows(&mut v, SortField::Token, SortDirection::Asc);
        let tokens: Vec<&str> = v.iter().map(|r| r.token.as_str()).collect();
        assert_eq!(tokens, vec!["Doctor", "She", "a", "doctor", "is"]);
    }

    #[test]
    fn sorting_twice_is_idempotent() {
        let rows = sample();
        for &field in SortField::all() {
            for dir in [SortDirection::Asc, SortDirection::Desc] {
                let mut once: Vec<&ActivationRow> = rows.iter().collect();
                sort_rows(&mut once, field, dir);
                let mut twice = once.clone();
                sort_rows(&mut twice, field, dir);
                assert_eq!(once, twice, "{field:?} {dir:?}");
            }
        }
    }

    #[test]
    fn toggle_sort_resets_or_flips_direction() {
        let mut view = TableView::default();
        assert_eq!(view.sort_field, SortField::ActivationScore);
        assert_eq!(view.direction, SortDirection::Desc);

        view.toggle_sort(SortField::ActivationScore);
        assert_eq!(view.direction, SortDirection::Asc);

        view.toggle_sort(SortField::Layer);
        assert_eq!(view.sort_field, SortField::Layer);
        assert_eq!(view.direction, SortDirection::Desc);

        view.toggle_sort(SortField::Token);
        view.toggle_sort(SortField::Token);
        assert_eq!(view.direction, SortDirection::Asc);
    }

    #[test]
    fn pages_cover_the_sequence_exactly_once() {
        let rows: Vec<ActivationRow> = (0..23)
            .map(|i| row(i % 5, i as u32, &format!("t{i}"), Some(i as f64), Some(i % 3)))
            .collect();

        for size in [1, 4, 10, 23, 50] {
            let mut view = TableView::default();
            view.set_page_size(size);
            let expected = filtered_sorted(&rows, &view);
            let pages = total_pages(expected.len(), size);
            assert_eq!(pages, expected.len().div_ceil(size));

            let mut concat = Vec::new();
            for p in 0..pages {
                view.page = p;
                let page = project(&rows, &view);
                assert_eq!(page.total_pages, pages);
                concat.extend(page.rows);
            }
            assert_eq!(concat, expected);
        }
        assert_eq!(total_pages(0, 20), 0);
    }

    #[test]
    fn paging_is_clamped_at_both_ends() {
        let rows = sample();
        let mut view = TableView::default();
        view.set_page_size(2);

        view.prev_page();
        assert_eq!(view.page, 0);

        view.next_page(rows.len());
        view.next_page(rows.len());
        view.next_page(rows.len());
        assert_eq!(view.page, 2);
    }

    #[test]
    fn filter_change_resets_page_and_projection_clamps_stale_page() {
        let rows = sample();
        let mut view = TableView::default();
        view.set_page_size(2);
        view.page = 2;

        view.set_filter("doctor");
        assert_eq!(view.page, 0);

        // A page index left past the end is clamped on read.
        view.page = 9;
        let page = project(&rows, &view);
        assert_eq!(page.page, 0);
        assert_eq!(page.rows.len(), 2);

        view.clamp_page(page.matching_rows);
        assert_eq!(view.page, 0);
    }
}
