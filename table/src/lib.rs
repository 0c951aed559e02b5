//! # Table
//!
//! The list contract between a display surface and a data source, kept
//! independent of any particular rendering. A [`ListController`] owns the
//! paging/filter/sort state; every accepted state change clears the visible
//! rows to a loading affordance and hands back a [`FetchTicket`]. The
//! consumer runs its [`Fetch`] implementation with the ticket's query and
//! feeds the result to [`ListController::apply`], which discards anything
//! superseded by a newer state change — rapid paging never lets a stale
//! response overwrite a fresher one.
//!
//! The data source reports `count`, the total matches ignoring pagination;
//! page navigation clamps to `ceil(count / page_size)` and out-of-range
//! requests are ignored without issuing a fetch.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Ascending => "asc",
            Direction::Descending => "desc",
        }
    }
}

/// The query a data source answers: page, page size, filter fields, and an
/// optional single-column sort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListState {
    pub page: u64,
    pub page_size: u64,
    pub filters: BTreeMap<String, String>,
    pub sort: Option<String>,
    pub direction: Direction,
}

/// One page of rows plus the total match count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<R> {
    pub rows: Vec<R>,
    pub count: u64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct FetchError(pub String);

/// A data source for the list contract.
#[async_trait]
pub trait Fetch<R> {
    async fn fetch(&self, state: &ListState) -> Result<Page<R>, FetchError>;
}

/// What the display surface shows for the row area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowsState<R> {
    /// A fetch is in flight; show the loading affordance, never stale rows.
    Loading,
    Loaded(Vec<R>),
}

/// Proof of a state change. Apply the fetch result together with its ticket;
/// a ticket from a superseded state change is rejected as stale.
#[derive(Debug)]
pub struct FetchTicket {
    generation: u64,
    pub query: ListState,
}

/// How an applied result landed.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// A newer state change superseded this fetch; nothing was touched.
    Stale,
    /// The fetch failed; the rows fall back to an empty state and the
    /// message should surface as a notification.
    Failed(String),
}

pub struct ListController<R> {
    state: ListState,
    rows: RowsState<R>,
    count: Option<u64>,
    generation: u64,
}

impl<R> ListController<R> {
    /// A fresh controller on page 1 with no filters or sort, already in the
    /// loading state. Run the returned ticket to populate the first page.
    pub fn new(page_size: u64) -> (Self, FetchTicket) {
        let mut controller = Self {
            state: ListState {
                page: 1,
                page_size: page_size.max(1),
                filters: BTreeMap::new(),
                sort: None,
                direction: Direction::Ascending,
            },
            rows: RowsState::Loading,
            count: None,
            generation: 0,
        };
        let ticket = controller.begin();
        (controller, ticket)
    }

    pub fn state(&self) -> &ListState {
        &self.state
    }

    pub fn rows(&self) -> &RowsState<R> {
        &self.rows
    }

    pub fn count(&self) -> Option<u64> {
        self.count
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.rows, RowsState::Loading)
    }

    /// Total pages for the last reported count: `ceil(count / page_size)`.
    /// Unknown until the first fetch resolves.
    pub fn max_pages(&self) -> Option<u64> {
        self.count
            .map(|count| count.div_ceil(self.state.page_size))
    }

    /// Zero matching rows: the surface shows a "no records" affordance
    /// rather than a spinner or an error.
    pub fn is_empty(&self) -> bool {
        self.count == Some(0)
    }

    /// Navigates to `page`. Out-of-range targets (below 1, beyond
    /// [`Self::max_pages`], or before any count is known) are ignored and
    /// no fetch is issued.
    pub fn set_page(&mut self, page: u64) -> Option<FetchTicket> {
        let max_pages = self.max_pages()?;
        if page < 1 || page > max_pages || page == self.state.page {
            return None;
        }
        self.state.page = page;
        Some(self.begin())
    }

    pub fn set_filters(&mut self, filters: BTreeMap<String, String>) -> FetchTicket {
        self.state.filters = filters;
        self.begin()
    }

    /// Sort cycle per column: unsorted -> ascending -> descending ->
    /// unsorted. Clicking a different column restarts at ascending. Ignored
    /// while a fetch is in flight (the header is disabled then).
    pub fn toggle_sort(&mut self, column: &str) -> Option<FetchTicket> {
        if self.is_loading() {
            return None;
        }
        if self.state.sort.as_deref() != Some(column) {
            self.state.sort = Some(column.to_string());
            self.state.direction = Direction::Ascending;
        } else if self.state.direction == Direction::Ascending {
            self.state.direction = Direction::Descending;
        } else {
            self.state.sort = None;
            self.state.direction = Direction::Ascending;
        }
        Some(self.begin())
    }

    fn begin(&mut self) -> FetchTicket {
        self.generation += 1;
        self.rows = RowsState::Loading;
        FetchTicket {
            generation: self.generation,
            query: self.state.clone(),
        }
    }

    /// Applies a fetch result. Only the ticket from the latest state change
    /// is accepted; anything older is reported [`Outcome::Stale`] and
    /// leaves the controller untouched.
    pub fn apply(&mut self, ticket: &FetchTicket, result: Result<Page<R>, FetchError>) -> Outcome {
        if ticket.generation != self.generation {
            return Outcome::Stale;
        }
        match result {
            Ok(page) => {
                self.count = Some(page.count);
                self.rows = RowsState::Loaded(page.rows);
                Outcome::Applied
            }
            Err(err) => {
                self.rows = RowsState::Loaded(Vec::new());
                Outcome::Failed(err.0)
            }
        }
    }

    /// Convenience for sequential consumers: fetch the ticket's query and
    /// apply the result in one go.
    pub async fn refresh<F>(&mut self, fetcher: &F, ticket: FetchTicket) -> Outcome
    where
        F: Fetch<R> + Sync,
    {
        let result = fetcher.fetch(&ticket.query).await;
        self.apply(&ticket, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serves rows out of a fixed set, slicing by the requested page.
    struct Rows(Vec<u32>);

    #[async_trait]
    impl Fetch<u32> for Rows {
        async fn fetch(&self, state: &ListState) -> Result<Page<u32>, FetchError> {
            let skip = ((state.page - 1) * state.page_size) as usize;
            let rows = self
                .0
                .iter()
                .copied()
                .skip(skip)
                .take(state.page_size as usize)
                .collect();
            Ok(Page {
                rows,
                count: self.0.len() as u64,
            })
        }
    }

    struct Failing;

    #[async_trait]
    impl Fetch<u32> for Failing {
        async fn fetch(&self, _state: &ListState) -> Result<Page<u32>, FetchError> {
            Err(FetchError("boom".to_string()))
        }
    }

    fn loaded<R: Clone>(controller: &ListController<R>) -> Vec<R> {
        match controller.rows() {
            RowsState::Loaded(rows) => rows.clone(),
            RowsState::Loading => panic!("rows still loading"),
        }
    }

    #[tokio::test]
    async fn max_pages_is_the_ceiling_of_count_over_page_size() {
        let rows = Rows((0..7).collect());
        let (mut controller, ticket) = ListController::new(3);

        assert!(controller.is_loading());
        assert_eq!(controller.refresh(&rows, ticket).await, Outcome::Applied);

        assert_eq!(controller.count(), Some(7));
        assert_eq!(controller.max_pages(), Some(3));
        assert_eq!(loaded(&controller), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn out_of_range_pages_are_ignored_without_a_fetch() {
        let rows = Rows((0..7).collect());
        let (mut controller, ticket) = ListController::new(3);
        controller.refresh(&rows, ticket).await;

        assert!(controller.set_page(0).is_none());
        assert!(controller.set_page(4).is_none());
        // Still showing the applied first page, not loading.
        assert!(!controller.is_loading());
        assert_eq!(controller.state().page, 1);

        let ticket = controller.set_page(3).expect("page 3 is in range");
        assert!(controller.is_loading());
        controller.refresh(&rows, ticket).await;
        assert_eq!(loaded(&controller), vec![6]);
    }

    #[tokio::test]
    async fn page_changes_are_rejected_before_the_first_count_arrives() {
        let (mut controller, _ticket) = ListController::<u32>::new(3);
        assert!(controller.set_page(2).is_none());
    }

    #[test]
    fn sort_cycles_per_column_and_resets_on_a_new_column() {
        let (mut controller, ticket) = ListController::<u32>::new(3);
        controller.apply(
            &ticket,
            Ok(Page {
                rows: vec![],
                count: 0,
            }),
        );

        let ticket = controller.toggle_sort("name").unwrap();
        assert_eq!(ticket.query.sort.as_deref(), Some("name"));
        assert_eq!(ticket.query.direction, Direction::Ascending);
        controller.apply(&ticket, Ok(Page { rows: vec![], count: 0 }));

        let ticket = controller.toggle_sort("name").unwrap();
        assert_eq!(ticket.query.direction, Direction::Descending);
        controller.apply(&ticket, Ok(Page { rows: vec![], count: 0 }));

        let ticket = controller.toggle_sort("name").unwrap();
        assert_eq!(ticket.query.sort, None);
        assert_eq!(ticket.query.direction, Direction::Ascending);
        controller.apply(&ticket, Ok(Page { rows: vec![], count: 0 }));

        // Descending on one column, then a different column starts over
        // ascending.
        let ticket = controller.toggle_sort("volume").unwrap();
        controller.apply(&ticket, Ok(Page { rows: vec![], count: 0 }));
        let ticket = controller.toggle_sort("volume").unwrap();
        controller.apply(&ticket, Ok(Page { rows: vec![], count: 0 }));
        let ticket = controller.toggle_sort("date").unwrap();
        assert_eq!(ticket.query.sort.as_deref(), Some("date"));
        assert_eq!(ticket.query.direction, Direction::Ascending);
    }

    #[test]
    fn sorting_is_disabled_while_loading() {
        let (mut controller, _ticket) = ListController::<u32>::new(3);
        assert!(controller.is_loading());
        assert!(controller.toggle_sort("name").is_none());
    }

    #[test]
    fn state_changes_clear_rows_and_stale_responses_are_discarded() {
        let (mut controller, first) = ListController::<u32>::new(3);
        controller.apply(
            &first,
            Ok(Page {
                rows: vec![1, 2, 3],
                count: 9,
            }),
        );

        // Two rapid page changes; the first fetch is still in flight when
        // the second starts.
        let slow = controller.set_page(2).unwrap();
        assert!(controller.is_loading());
        let fresh = controller.set_page(3).unwrap();

        let fresh_outcome = controller.apply(
            &fresh,
            Ok(Page {
                rows: vec![7, 8, 9],
                count: 9,
            }),
        );
        assert_eq!(fresh_outcome, Outcome::Applied);

        // The superseded response lands afterwards and must not overwrite.
        let slow_outcome = controller.apply(
            &slow,
            Ok(Page {
                rows: vec![4, 5, 6],
                count: 9,
            }),
        );
        assert_eq!(slow_outcome, Outcome::Stale);

        match controller.rows() {
            RowsState::Loaded(rows) => assert_eq!(rows, &vec![7, 8, 9]),
            RowsState::Loading => panic!("rows still loading"),
        }
    }

    #[test]
    fn filter_changes_reset_rows_to_loading() {
        let (mut controller, ticket) = ListController::<u32>::new(3);
        controller.apply(
            &ticket,
            Ok(Page {
                rows: vec![1],
                count: 1,
            }),
        );
        assert!(!controller.is_loading());

        let mut filters = BTreeMap::new();
        filters.insert("name".to_string(), "die".to_string());
        let ticket = controller.set_filters(filters.clone());

        assert!(controller.is_loading());
        assert_eq!(ticket.query.filters, filters);
    }

    #[tokio::test]
    async fn fetch_errors_surface_as_a_notification_and_leave_an_empty_table() {
        let (mut controller, ticket) = ListController::<u32>::new(3);

        let outcome = controller.refresh(&Failing, ticket).await;
        assert_eq!(outcome, Outcome::Failed("boom".to_string()));
        assert_eq!(loaded(&controller), Vec::<u32>::new());
    }

    #[tokio::test]
    async fn zero_count_means_zero_pages_and_an_empty_affordance() {
        let rows = Rows(vec![]);
        let (mut controller, ticket) = ListController::new(3);
        controller.refresh(&rows, ticket).await;

        assert!(controller.is_empty());
        assert_eq!(controller.max_pages(), Some(0));
        assert!(controller.set_page(2).is_none());
    }
}
