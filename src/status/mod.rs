//! Registration status view
//!
//! [`LiveStatus`] keeps a [`Reconciler`](crate::reconciler::Reconciler) fed from
//! the relay; [`TableQuery`] turns its list into the page a viewer sees.

mod live;
mod table;

pub use live::LiveStatus;
pub use table::{
    format_synced_at, TablePage, TableQuery, TableRow, DEFAULT_PAGE_SIZE, NOT_SYNCED, NO_RESULTS,
};
