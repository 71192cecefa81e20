//! Overlap resolution between a new group and the live translated spans.
//! Keeps the invariant that no two live spans overlap.

use crate::keys::SpanKey;

/// Outcome of reconciling one new group against the live spans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// The exact key is already live and the call was not forced.
    pub already_present: bool,
    /// Live spans to delete, in ascending key order.
    pub to_delete: Vec<SpanKey>,
    /// Index runs of deleted spans that fall outside the new group. The parts
    /// left and right of the new group are separate runs, so regrouping can
    /// never bridge across it.
    pub remainders: Vec<Vec<usize>>,
}

/// Reconcile `new` against `live`, which must be sorted ascending.
///
/// Exact match: no-op unless forced, then delete. Subset of `new`: delete.
/// Any other overlap: delete and report the parts outside `new` as remainders.
pub fn reconcile<'a, I>(new: SpanKey, live: I, force: bool) -> Reconciliation
where
    I: IntoIterator<Item = &'a SpanKey>,
{
    let mut out = Reconciliation::default();

    for &existing in live {
        if existing == new {
            if force {
                out.to_delete.push(existing);
            } else {
                out.already_present = true;
            }
        } else if new.contains(&existing) {
            out.to_delete.push(existing);
        } else if existing.overlaps(&new) {
            out.to_delete.push(existing);
            if existing.start < new.start {
                out.remainders.push((existing.start..new.start).collect());
            }
            if existing.end > new.end {
                out.remainders.push((new.end + 1..=existing.end).collect());
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(s: usize, e: usize) -> SpanKey {
        SpanKey::new(s, e)
    }

    #[test]
    fn exact_match_is_noop_unless_forced() {
        let live = [k(0, 2)];
        let r = reconcile(k(0, 2), &live, false);
        assert!(r.already_present);
        assert!(r.to_delete.is_empty());

        let r = reconcile(k(0, 2), &live, true);
        assert!(!r.already_present);
        assert_eq!(r.to_delete, vec![k(0, 2)]);
    }

    #[test]
    fn subsets_are_absorbed() {
        let live = [k(0, 0), k(2, 3), k(9, 9)];
        let r = reconcile(k(0, 4), &live, false);
        assert_eq!(r.to_delete, vec![k(0, 0), k(2, 3)]);
        assert!(r.remainders.is_empty());
    }

    #[test]
    fn partial_overlap_yields_remainder() {
        let live = [k(2, 6)];
        let r = reconcile(k(5, 8), &live, false);
        assert_eq!(r.to_delete, vec![k(2, 6)]);
        assert_eq!(r.remainders, vec![vec![2, 3, 4]]);
    }

    #[test]
    fn superset_split_leaves_both_sides() {
        let live = [k(0, 6)];
        let r = reconcile(k(2, 3), &live, false);
        assert_eq!(r.to_delete, vec![k(0, 6)]);
        assert_eq!(r.remainders, vec![vec![0, 1], vec![4, 5, 6]]);
    }

    #[test]
    fn partial_overlap_on_the_left_keeps_the_right_side() {
        let live = [k(4, 9)];
        let r = reconcile(k(2, 5), &live, false);
        assert_eq!(r.remainders, vec![vec![6, 7, 8, 9]]);
    }

    #[test]
    fn disjoint_spans_untouched() {
        let live = [k(0, 1), k(5, 6)];
        let r = reconcile(k(2, 4), &live, false);
        assert_eq!(r, Reconciliation::default());
    }
}
