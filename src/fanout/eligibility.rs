//! Who gets to see which request.
//!
//! The predicate lives here once. `PgStore` restates it in SQL (`&&` on the category
//! arrays, `NOT EXISTS` on responses/ledger), `MemoryStore` calls these functions.

use chrono::{DateTime, Utc};

use crate::storage::models::{Guide, Request};

/// Which prior contact disqualifies a guide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EligibilityFilter {
    /// Proactive push: skip guides already pushed or already answered.
    Fanout,
    /// Manual browsing: skip only requests the guide already answered or rejected.
    Browse,
}

impl EligibilityFilter {
    pub fn admits(self, responded: bool, notified: bool) -> bool {
        match self {
            EligibilityFilter::Fanout => !responded && !notified,
            EligibilityFilter::Browse => !responded,
        }
    }
}

/// Tag sets intersect. Empty on either side never matches.
pub fn categories_overlap(a: &[String], b: &[String]) -> bool {
    a.iter().any(|tag| b.contains(tag))
}

/// Reachable, enabled and paid up.
pub fn guide_is_available(guide: &Guide, now: DateTime<Utc>) -> bool {
    guide.telegram_id.is_some() && guide.is_active && guide.subscription_until.map_or(true, |until| until >= now)
}

/// Eligibility without the prior-contact part.
pub fn is_eligible(guide: &Guide, request: &Request, now: DateTime<Utc>) -> bool {
    guide_is_available(guide, now) && categories_overlap(&guide.categories, &request.categories)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::RequestStatus;
    use chrono::Duration;
    use uuid::Uuid;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn guide(categories: &[&str]) -> Guide {
        Guide {
            id: Uuid::new_v4(),
            name: "Marta".to_string(),
            telegram_id: Some(1001),
            is_active: true,
            subscription_until: None,
            categories: tags(categories),
        }
    }

    fn request(categories: &[&str]) -> Request {
        Request {
            id: Uuid::new_v4(),
            code: "R-1".to_string(),
            user_id: Uuid::new_v4(),
            body: "Need a boat for Saturday".to_string(),
            categories: tags(categories),
            status: RequestStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_overlapping_categories_match() {
        let now = Utc::now();
        assert!(is_eligible(&guide(&["taxi"]), &request(&["boats", "taxi"]), now));
        assert!(!is_eligible(&guide(&["food"]), &request(&["boats", "taxi"]), now));
    }

    #[test]
    fn test_empty_categories_never_match() {
        let now = Utc::now();
        assert!(!is_eligible(&guide(&[]), &request(&["boats"]), now));
        assert!(!is_eligible(&guide(&["boats"]), &request(&[]), now));
        assert!(!categories_overlap(&[], &[]));
    }

    #[test]
    fn test_expired_subscription_excludes_guide() {
        let now = Utc::now();
        let mut g = guide(&["taxi"]);
        g.subscription_until = Some(now - Duration::days(1));
        assert!(!is_eligible(&g, &request(&["taxi"]), now));

        g.subscription_until = Some(now + Duration::days(1));
        assert!(is_eligible(&g, &request(&["taxi"]), now));

        // Boundary: expiry exactly now still counts
        g.subscription_until = Some(now);
        assert!(is_eligible(&g, &request(&["taxi"]), now));
    }

    #[test]
    fn test_unlinked_or_inactive_guide_is_unavailable() {
        let now = Utc::now();
        let mut g = guide(&["taxi"]);
        g.telegram_id = None;
        assert!(!guide_is_available(&g, now));

        let mut g = guide(&["taxi"]);
        g.is_active = false;
        assert!(!guide_is_available(&g, now));
    }

    #[test]
    fn test_filters_differ_on_ledger_only() {
        assert!(EligibilityFilter::Fanout.admits(false, false));
        assert!(!EligibilityFilter::Fanout.admits(false, true));
        assert!(!EligibilityFilter::Fanout.admits(true, false));

        assert!(EligibilityFilter::Browse.admits(false, true));
        assert!(!EligibilityFilter::Browse.admits(true, false));
    }
}
