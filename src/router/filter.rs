use std::collections::HashMap;

use alloy::primitives::U256;
use tracing::debug;

use super::routes::{route_amount_in, Path, Route};
use crate::types::ChainId;

/// Keep exactly the routes whose legs add up to `amount_in`.
pub fn filter_routes(routes: Vec<Route>, amount_in: U256) -> Vec<Route> {
    routes
        .into_iter()
        .filter(|route| route_amount_in(route) == amount_in)
        .collect()
}

/// Every included chain must be visited and no excluded chain may be.
/// Missing maps fail closed.
pub fn is_valid_for_network_compliance(
    route: &Route,
    from_included: Option<&HashMap<ChainId, bool>>,
    from_excluded: Option<&HashMap<ChainId, bool>>,
) -> bool {
    let (Some(included), Some(excluded)) = (from_included, from_excluded) else {
        return false;
    };

    let mut visited = included.clone();
    for path in route {
        let chain_id = path.from_chain.chain_id;
        if chain_id == 0 {
            debug!("invalid path without origin chain");
            return false;
        }
        if excluded.contains_key(&chain_id) {
            debug!("route touches excluded chain {}", chain_id);
            return false;
        }
        if let Some(seen) = visited.get_mut(&chain_id) {
            *seen = true;
        }
    }

    match visited.iter().find(|(_, seen)| !**seen) {
        Some((chain_id, _)) => {
            debug!("route misses included chain {}", chain_id);
            false
        }
        None => true,
    }
}

/// Sum of every leg except the one at `exclude`.
pub fn calculate_rest_amount_in(route: &Route, exclude: Option<&Path>) -> U256 {
    route
        .iter()
        .filter(|path| match exclude {
            Some(excluded) => !std::ptr::eq(*path, excluded),
            None => true,
        })
        .fold(U256::ZERO, |acc, path| acc + path.amount_in)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::network;

    fn path(chain_id: ChainId, amount: u64) -> Path {
        Path { from_chain: network(chain_id), amount_in: U256::from(amount), ..Default::default() }
    }

    fn map(entries: &[ChainId]) -> HashMap<ChainId, bool> {
        entries.iter().map(|c| (*c, false)).collect()
    }

    #[test]
    fn test_filter_keeps_exact_sums_only() {
        let routes = vec![
            vec![path(1, 100), path(2, 200), path(3, 300)],
            vec![path(1, 100), path(2, 200)],
            vec![path(3, 300)],
            vec![path(4, 400)],
        ];
        let kept = filter_routes(routes, U256::from(300));
        assert_eq!(kept.len(), 2);
        for route in &kept {
            assert_eq!(route_amount_in(route), U256::from(300));
        }
    }

    #[test]
    fn test_filter_empty_when_nothing_matches() {
        let routes = vec![vec![path(1, 100)], vec![path(2, 500)]];
        assert!(filter_routes(routes, U256::from(300)).is_empty());
    }

    #[test]
    fn test_compliance_cases() {
        let cases: Vec<(Route, Option<HashMap<ChainId, bool>>, Option<HashMap<ChainId, bool>>, bool)> = vec![
            (vec![path(1, 100), path(2, 200)], Some(map(&[1, 2])), Some(map(&[])), true),
            (vec![path(1, 100), path(2, 200)], Some(map(&[])), Some(map(&[3, 4])), true),
            (vec![path(1, 100), path(2, 200)], Some(map(&[1, 2])), Some(map(&[3, 4])), true),
            (vec![path(1, 100), path(3, 300)], Some(map(&[1, 2])), Some(map(&[3, 4])), false),
            (vec![path(1, 100)], Some(map(&[1, 2])), Some(map(&[])), false),
            (vec![path(1, 100), path(2, 200)], None, None, false),
            (vec![path(1, 100)], Some(map(&[1])), None, false),
            (vec![path(0, 100)], Some(map(&[])), Some(map(&[])), false),
            (vec![], Some(map(&[])), Some(map(&[])), true),
        ];
        for (route, included, excluded, expected) in cases {
            assert_eq!(
                is_valid_for_network_compliance(&route, included.as_ref(), excluded.as_ref()),
                expected,
                "route {:?}",
                route.iter().map(|p| p.from_chain.chain_id).collect::<Vec<_>>()
            );
        }
    }

    #[test]
    fn test_compliance_requires_every_included_chain() {
        // chain 2 is required but never visited
        let route = vec![path(1, 100), path(3, 200)];
        assert!(!is_valid_for_network_compliance(&route, Some(&map(&[1, 2])), Some(&map(&[]))));
    }

    #[test]
    fn test_rest_amount_in() {
        let route = vec![path(1, 100), path(2, 200), path(3, 300)];
        assert_eq!(calculate_rest_amount_in(&route, Some(&route[0])), U256::from(500));
        assert_eq!(calculate_rest_amount_in(&route, Some(&route[1])), U256::from(400));
        assert_eq!(calculate_rest_amount_in(&route, Some(&route[2])), U256::from(300));
        assert_eq!(calculate_rest_amount_in(&route, None), U256::from(600));

        let single = vec![path(1, 100)];
        assert_eq!(calculate_rest_amount_in(&single, Some(&single[0])), U256::ZERO);

        let outside = path(9, 900);
        assert_eq!(calculate_rest_amount_in(&Vec::new(), Some(&outside)), U256::ZERO);
    }
}
