//! Plurality vote over an ANN neighborhood.

/// Return the most frequent item, breaking ties by first-encountered order.
///
/// The tie-break is load-bearing for reproducibility: two identities with
/// equal support resolve to whichever appeared first in the neighbor list.
pub fn plurality<'a>(items: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    // Counts keyed by encounter order, so ties resolve to the earlier entry.
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for item in items {
        match counts.iter_mut().find(|(seen, _)| *seen == item) {
            Some((_, n)) => *n += 1,
            None => counts.push((item, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (item, n) in counts {
        match best {
            Some((_, best_n)) if n <= best_n => {}
            _ => best = Some((item, n)),
        }
    }
    best.map(|(item, _)| item)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plurality_majority() {
        let ids = ["a", "b", "a", "c", "a"];
        assert_eq!(plurality(ids), Some("a"));
    }

    #[test]
    fn test_plurality_tie_breaks_first_encountered() {
        let ids = ["b", "a", "a", "b"];
        assert_eq!(plurality(ids), Some("b"));

        let ids = ["a", "b", "b", "a"];
        assert_eq!(plurality(ids), Some("a"));
    }

    #[test]
    fn test_plurality_single_item() {
        assert_eq!(plurality(["x"]), Some("x"));
    }

    #[test]
    fn test_plurality_empty() {
        assert_eq!(plurality(std::iter::empty::<&str>()), None);
    }

    #[test]
    fn test_plurality_later_majority_beats_earlier_minority() {
        let ids = ["a", "b", "b"];
        assert_eq!(plurality(ids), Some("b"));
    }
}
