use std::cmp::Ordering;

/// Represents a type that can be ordered into a play order.
pub trait Rankable {
    /// The number of votes the item currently has.
    fn vote_count(&self) -> u32;

    /// A key that increases with every submission, used to break ties.
    fn submission_order(&self) -> i64;
}

/// Orders items by votes, most first. Equally voted items keep their submission order.
pub fn rank<T>(mut items: Vec<T>) -> Vec<T>
where
    T: Rankable,
{
    items.sort_by(compare);
    items
}

/// Returns the item that plays next, if any.
pub fn head<T>(items: &[T]) -> Option<&T>
where
    T: Rankable,
{
    items.iter().min_by(|a, b| compare(*a, *b))
}

fn compare<T: Rankable>(a: &T, b: &T) -> Ordering {
    b.vote_count()
        .cmp(&a.vote_count())
        .then_with(|| a.submission_order().cmp(&b.submission_order()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item(&'static str, u32, i64);

    impl Rankable for Item {
        fn vote_count(&self) -> u32 {
            self.1
        }

        fn submission_order(&self) -> i64 {
            self.2
        }
    }

    fn names(items: &[Item]) -> Vec<&'static str> {
        items.iter().map(|i| i.0).collect()
    }

    #[test]
    fn test_ties_keep_submission_order() {
        let items = vec![Item("A", 3, 1), Item("B", 3, 2), Item("C", 1, 3)];
        let ranked = rank(items.clone());

        assert_eq!(names(&ranked), ["A", "B", "C"]);

        // C gains a vote but stays behind the tie
        let items = vec![Item("A", 3, 1), Item("B", 3, 2), Item("C", 2, 3)];
        assert_eq!(names(&rank(items)), ["A", "B", "C"]);
    }

    #[test]
    fn test_rank_ignores_input_order() {
        let items = vec![Item("C", 1, 3), Item("B", 3, 2), Item("D", 0, 4), Item("A", 3, 1)];
        let ranked = rank(items);

        assert_eq!(names(&ranked), ["A", "B", "C", "D"]);
        assert_eq!(names(&rank(ranked.clone())), names(&ranked));
    }

    #[test]
    fn test_votes_move_items_forward() {
        let items = vec![Item("A", 0, 1), Item("B", 0, 2), Item("C", 1, 3)];

        assert_eq!(names(&rank(items)), ["C", "A", "B"]);
    }

    #[test]
    fn test_head_matches_rank() {
        let items = vec![Item("B", 2, 2), Item("A", 2, 1), Item("C", 1, 3)];

        assert_eq!(head(&items).map(|i| i.0), Some("A"));
        assert_eq!(head(&items), rank(items.clone()).first());
        assert_eq!(head::<Item>(&[]), None);
    }
}
