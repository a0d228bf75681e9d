//! Crawl stages
//!
//! Listing and pagination pages are fetched by the same fetcher and run the
//! same match handlers; the distinction only shows where a URL came from.

use std::fmt;

/// One phase of the crawl state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Index page listing detail links
    Listing,

    /// Further index page reached through a pagination link
    Pagination,

    /// Page describing one or more records
    Detail,

    /// Page that completes records started on a detail page
    SecondaryDetail,
}

impl Stage {
    /// Stages a page of this stage may hand URLs to
    pub fn next_stages(&self) -> &'static [Stage] {
        match self {
            Self::Listing | Self::Pagination => &[Self::Pagination, Self::Detail],
            Self::Detail => &[Self::SecondaryDetail],
            Self::SecondaryDetail => &[],
        }
    }

    /// Returns true if `next` is a legal follow-up of this stage
    pub fn can_hand_off_to(&self, next: Stage) -> bool {
        self.next_stages().contains(&next)
    }

    /// Returns true for stages whose matches run a script
    pub fn runs_script(&self) -> bool {
        matches!(self, Self::Detail | Self::SecondaryDetail)
    }

    /// Returns true for stages served by the listing fetcher
    pub fn is_index(&self) -> bool {
        matches!(self, Self::Listing | Self::Pagination)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Pagination => "pagination",
            Self::Detail => "detail",
            Self::SecondaryDetail => "secondary_detail",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
