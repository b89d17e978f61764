use std::collections::BTreeSet;

use shared::{
    domain::MemberId,
    protocol::{MemberPage, MemberRecord, PageQuery, DEFAULT_PAGE_LIMIT},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    Members,
    Candidates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paging {
    Server,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub offset: u64,
    pub limit: u64,
}

impl PageCursor {
    pub fn new(limit: u64) -> Self {
        Self {
            offset: 0,
            limit: limit.max(1),
        }
    }

    pub fn query(&self) -> PageQuery {
        PageQuery::new(self.offset, self.limit)
    }
}

impl Default for PageCursor {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_LIMIT)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaginatedView {
    rows: Vec<MemberRecord>,
    total: u64,
    offset: u64,
    limit: u64,
    paging: Paging,
}

impl PaginatedView {
    pub fn empty(paging: Paging, cursor: PageCursor) -> Self {
        Self {
            rows: Vec::new(),
            total: 0,
            offset: cursor.offset,
            limit: cursor.limit,
            paging,
        }
    }

    /// A page as returned by the authority; `total` is the authority's count.
    pub fn server_page(page: MemberPage, cursor: PageCursor) -> Self {
        let limit = if page.limit > 0 { page.limit } else { cursor.limit };
        Self {
            rows: page.rows,
            total: page.total,
            offset: page.offset,
            limit,
            paging: Paging::Server,
        }
    }

    pub fn client_rows(rows: Vec<MemberRecord>, cursor: PageCursor) -> Self {
        Self {
            total: rows.len() as u64,
            rows,
            offset: cursor.offset,
            limit: cursor.limit,
            paging: Paging::Client,
        }
    }

    pub fn with_cursor(&self, cursor: PageCursor) -> Self {
        Self {
            rows: self.rows.clone(),
            total: self.total,
            offset: cursor.offset,
            limit: cursor.limit,
            paging: self.paging,
        }
    }

    pub fn rows(&self) -> &[MemberRecord] {
        &self.rows
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, id: &MemberId) -> bool {
        self.rows.iter().any(|row| &row.id == id)
    }

    /// Rows on the current page. Server-paged views already hold a single page.
    pub fn visible_rows(&self) -> &[MemberRecord] {
        match self.paging {
            Paging::Server => &self.rows,
            Paging::Client => {
                let len = self.rows.len();
                let start = usize::try_from(self.offset).unwrap_or(usize::MAX).min(len);
                let end = start
                    .saturating_add(usize::try_from(self.limit).unwrap_or(usize::MAX))
                    .min(len);
                &self.rows[start..end]
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    ids: BTreeSet<MemberId>,
}

impl SelectionSet {
    pub fn from_ids(ids: impl IntoIterator<Item = MemberId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn contains(&self, id: &MemberId) -> bool {
        self.ids.contains(id)
    }

    pub fn to_vec(&self) -> Vec<MemberId> {
        self.ids.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize) -> Vec<MemberRecord> {
        (0..n).map(|i| MemberRecord::new(format!("m{i}"))).collect()
    }

    #[test]
    fn client_view_windows_rows() {
        let view = PaginatedView::client_rows(rows(5), PageCursor { offset: 2, limit: 2 });
        let ids: Vec<_> = view.visible_rows().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["m2", "m3"]);
        assert_eq!(view.total(), 5);
    }

    #[test]
    fn client_view_window_clamps_past_end() {
        let view = PaginatedView::client_rows(rows(3), PageCursor { offset: 10, limit: 5 });
        assert!(view.visible_rows().is_empty());

        let tail = view.with_cursor(PageCursor { offset: 2, limit: 5 });
        assert_eq!(tail.visible_rows().len(), 1);
    }

    #[test]
    fn server_view_keeps_authority_total() {
        let page = MemberPage {
            rows: rows(2),
            total: 40,
            offset: 20,
            limit: 0,
        };
        let view = PaginatedView::server_page(page, PageCursor::new(10));
        assert_eq!(view.total(), 40);
        assert_eq!(view.offset(), 20);
        assert_eq!(view.limit(), 10);
        assert_eq!(view.visible_rows().len(), 2);
    }

    #[test]
    fn cursor_limit_is_never_zero() {
        assert_eq!(PageCursor::new(0).limit, 1);
    }

    #[test]
    fn selection_deduplicates() {
        let selection = SelectionSet::from_ids(vec![
            MemberId::from("b"),
            MemberId::from("a"),
            MemberId::from("b"),
        ]);
        assert_eq!(selection.len(), 2);
        assert_eq!(selection.to_vec(), vec![MemberId::from("a"), MemberId::from("b")]);
        assert!(selection.contains(&MemberId::from("b")));
        assert!(!selection.contains(&MemberId::from("c")));
    }
}
