//! Cube pruning over any number of sorted dimensions.
//!
//! Each cube is the lazy Cartesian product of N lists sorted best first
//! (predecessors x candidates in phrase mode, one list per nonterminal slot
//! plus the rule list in chart mode). All cubes of one stack or chart cell
//! share a single priority queue ordered by the speculative score of the
//! combination an item would produce. Popping an item materializes it and
//! queues its neighbours, each one step further along exactly one
//! dimension.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashSet};

use tracing::trace;

use crate::error::{DecodeError, DecodeResult, SortedList};

/// Scores and materializes the combinations of a cube.
pub trait CubeSource {
    type Cube;

    /// Score the combination at `coords` would get, computed without
    /// running the stateful models.
    fn speculative(&self, cube: &Self::Cube, coords: &[u32]) -> DecodeResult<f32>;

    fn materialize(&mut self, cube: &Self::Cube, coords: &[u32]) -> DecodeResult<()>;

    /// Span or coverage the cube belongs to, for error reports.
    fn describe(&self, cube: &Self::Cube) -> String;
}

struct CubeEntry<C> {
    cube: C,
    dims: Box<[u32]>,
    seen: HashSet<Box<[u32]>>,
}

struct Item {
    score: f32,
    seq: u64,
    cube: usize,
    coords: Box<[u32]>,
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Item {}

impl PartialOrd for Item {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Item {
    /// Max-heap order: higher score, then earlier push.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then(other.seq.cmp(&self.seq))
    }
}

pub struct Frontier<C> {
    cubes: Vec<CubeEntry<C>>,
    queue: BinaryHeap<Item>,
    next_seq: u64,
}

impl<C> Default for Frontier<C> {
    fn default() -> Self {
        Self {
            cubes: Vec::new(),
            queue: BinaryHeap::new(),
            next_seq: 0,
        }
    }
}

impl<C> Frontier<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_cubes(&self) -> usize {
        self.cubes.len()
    }

    /// Registers a cube with the given list lengths and queues its best
    /// corner. A cube with an empty dimension is never expanded.
    pub fn add_cube<S>(&mut self, source: &S, cube: C, dims: &[usize]) -> DecodeResult<()>
    where
        S: CubeSource<Cube = C>,
    {
        if dims.iter().any(|&d| d == 0) {
            return Ok(());
        }
        let dims: Box<[u32]> = dims
            .iter()
            .map(|&d| u32::try_from(d).map_err(|_| DecodeError::FrontierOverflow { len: d }))
            .collect::<DecodeResult<_>>()?;
        let origin: Box<[u32]> = vec![0; dims.len()].into_boxed_slice();
        let score = source.speculative(&cube, &origin)?;
        let index = self.cubes.len();
        let mut seen = HashSet::new();
        seen.insert(origin.clone());
        self.cubes.push(CubeEntry { cube, dims, seen });
        self.push(index, origin, score);
        Ok(())
    }

    fn push(&mut self, cube: usize, coords: Box<[u32]>, score: f32) {
        self.queue.push(Item {
            score,
            seq: self.next_seq,
            cube,
            coords,
        });
        self.next_seq += 1;
    }

    /// Pops and materializes up to `pop_limit` items (0 = until the queue is
    /// empty). Returns the number of pops.
    pub fn run<S>(&mut self, source: &mut S, pop_limit: usize) -> DecodeResult<usize>
    where
        S: CubeSource<Cube = C>,
    {
        let mut pops = 0;
        let mut last = f32::INFINITY;
        while pop_limit == 0 || pops < pop_limit {
            let Some(item) = self.queue.pop() else {
                break;
            };
            let entry = &self.cubes[item.cube];
            if item.score > last {
                return Err(DecodeError::NonMonotonic {
                    list: SortedList::Frontier,
                    span: source.describe(&entry.cube),
                    first: last,
                    second: item.score,
                });
            }
            last = item.score;
            trace!(cube = item.cube, coords = ?item.coords, score = item.score, "pop");
            source.materialize(&entry.cube, &item.coords)?;
            pops += 1;
            self.push_neighbors(source, &item)?;
        }
        Ok(pops)
    }

    /// Splits the remaining queue into one frontier per group of cubes.
    /// Every cube keeps its seen set and its queued items.
    pub fn into_groups<K: Ord + Clone>(self, key: impl Fn(&C) -> K) -> BTreeMap<K, Frontier<C>> {
        let mut groups: BTreeMap<K, Frontier<C>> = BTreeMap::new();
        let mut placement = Vec::with_capacity(self.cubes.len());
        for entry in self.cubes {
            let k = key(&entry.cube);
            let group = groups.entry(k.clone()).or_default();
            placement.push((k, group.cubes.len()));
            group.cubes.push(entry);
        }
        for mut item in self.queue.into_sorted_vec().into_iter().rev() {
            let (k, index) = &placement[item.cube];
            if let Some(group) = groups.get_mut(k) {
                item.cube = *index;
                item.seq = group.next_seq;
                group.next_seq += 1;
                group.queue.push(item);
            }
        }
        groups
    }

    fn push_neighbors<S>(&mut self, source: &S, item: &Item) -> DecodeResult<()>
    where
        S: CubeSource<Cube = C>,
    {
        for dim in 0..item.coords.len() {
            let entry = &mut self.cubes[item.cube];
            if item.coords[dim] + 1 >= entry.dims[dim] {
                continue;
            }
            let mut next = item.coords.clone();
            next[dim] += 1;
            if !entry.seen.insert(next.clone()) {
                continue;
            }
            let score = source.speculative(&entry.cube, &next)?;
            if score > item.score {
                return Err(DecodeError::NonMonotonic {
                    list: SortedList::Frontier,
                    span: source.describe(&entry.cube),
                    first: item.score,
                    second: score,
                });
            }
            self.push(item.cube, next, score);
        }
        Ok(())
    }
}

/// Verifies that a list claimed to be sorted best first really starts with
/// its best two items.
pub fn check_sorted(
    list: SortedList,
    span: impl FnOnce() -> String,
    scores: &[f32],
) -> DecodeResult<()> {
    if let &[first, second, ..] = scores {
        if first.is_nan() || second.is_nan() {
            return Err(DecodeError::InvalidScore { span: span() });
        }
        if second > first {
            return Err(DecodeError::NonMonotonic {
                list,
                span: span(),
                first,
                second,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sums one score per dimension.
    #[derive(Debug)]
    struct Lists {
        lists: Vec<Vec<Vec<f32>>>,
        popped: Vec<(usize, Vec<u32>, f32)>,
    }

    impl CubeSource for Lists {
        type Cube = usize;

        fn speculative(&self, cube: &usize, coords: &[u32]) -> DecodeResult<f32> {
            Ok(self.lists[*cube]
                .iter()
                .zip(coords)
                .map(|(l, &c)| l[c as usize])
                .sum())
        }

        fn materialize(&mut self, cube: &usize, coords: &[u32]) -> DecodeResult<()> {
            let score = self.speculative(cube, coords)?;
            self.popped.push((*cube, coords.to_vec(), score));
            Ok(())
        }

        fn describe(&self, cube: &usize) -> String {
            format!("cube {cube}")
        }
    }

    fn run(lists: Vec<Vec<Vec<f32>>>, pop_limit: usize) -> DecodeResult<Lists> {
        let mut src = Lists {
            lists,
            popped: Vec::new(),
        };
        let mut frontier = Frontier::new();
        for cube in 0..src.lists.len() {
            let dims: Vec<usize> = src.lists[cube].iter().map(Vec::len).collect();
            frontier.add_cube(&src, cube, &dims)?;
        }
        frontier.run(&mut src, pop_limit)?;
        Ok(src)
    }

    #[test]
    fn two_dimensional_best_first() {
        let src = run(vec![vec![vec![0.0, -1.0, -5.0], vec![-0.5, -2.0]]], 0).unwrap();
        assert_eq!(src.popped.len(), 6);
        let scores: Vec<f32> = src.popped.iter().map(|p| p.2).collect();
        assert_eq!(scores, vec![-0.5, -1.5, -2.0, -3.0, -5.5, -7.0]);
        assert_eq!(src.popped[0].1, vec![0, 0]);
    }

    #[test]
    fn pop_limit_bounds_materializations() {
        let src = run(
            vec![vec![vec![0.0, -1.0, -2.0, -3.0], vec![0.0, -1.0, -2.0, -3.0]]],
            5,
        )
        .unwrap();
        assert_eq!(src.popped.len(), 5);
        assert!(src.popped.windows(2).all(|w| w[0].2 >= w[1].2));
    }

    #[test]
    fn every_coordinate_once() {
        let src = run(
            vec![vec![vec![0.0, -1.0], vec![0.0, -1.0], vec![0.0, -1.0, -2.0]]],
            0,
        )
        .unwrap();
        assert_eq!(src.popped.len(), 12);
        let mut coords: Vec<Vec<u32>> = src.popped.iter().map(|p| p.1.clone()).collect();
        coords.sort();
        coords.dedup();
        assert_eq!(coords.len(), 12);
    }

    #[test]
    fn cubes_share_one_queue() {
        let src = run(
            vec![
                vec![vec![-1.0, -4.0], vec![0.0]],
                vec![vec![-2.0, -3.0], vec![0.0]],
            ],
            3,
        )
        .unwrap();
        let order: Vec<(usize, f32)> = src.popped.iter().map(|p| (p.0, p.2)).collect();
        assert_eq!(order, vec![(0, -1.0), (1, -2.0), (1, -3.0)]);
    }

    #[test]
    fn ties_pop_in_push_order() {
        let src = run(vec![vec![vec![0.0, -1.0]], vec![vec![0.0, -1.0]]], 0).unwrap();
        let cubes: Vec<usize> = src.popped.iter().map(|p| p.0).collect();
        assert_eq!(cubes, vec![0, 1, 0, 1]);
    }

    #[test]
    fn empty_dimension_is_skipped() {
        let src = run(vec![vec![vec![0.0], vec![]]], 0).unwrap();
        assert!(src.popped.is_empty());
    }

    #[test]
    fn unsorted_list_is_fatal() {
        let err = run(vec![vec![vec![-1.0, 0.0], vec![0.0]]], 0).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::NonMonotonic {
                list: SortedList::Frontier,
                ..
            }
        ));
    }

    #[test]
    fn groups_resume_where_the_shared_queue_stopped() {
        let mut src = Lists {
            lists: vec![
                vec![vec![0.0, -1.0, -2.0]],
                vec![vec![-0.5, -1.5]],
                vec![vec![-3.0]],
            ],
            popped: Vec::new(),
        };
        let mut frontier = Frontier::new();
        for cube in 0..3 {
            let dims = [src.lists[cube][0].len()];
            frontier.add_cube(&src, cube, &dims).unwrap();
        }
        frontier.run(&mut src, 2).unwrap();
        let mut groups = frontier.into_groups(|&cube| cube % 2);
        assert_eq!(groups.len(), 2);
        src.popped.clear();
        groups.get_mut(&0).unwrap().run(&mut src, 0).unwrap();
        let order: Vec<(usize, f32)> = src.popped.iter().map(|p| (p.0, p.2)).collect();
        assert_eq!(order, vec![(0, -1.0), (0, -2.0), (2, -3.0)]);
    }

    #[test]
    fn check_sorted_first_two() {
        assert!(check_sorted(SortedList::Candidates, String::new, &[-1.0, -2.0, 5.0]).is_ok());
        assert!(check_sorted(SortedList::Candidates, String::new, &[-1.0]).is_ok());
        let err = check_sorted(SortedList::Predecessors, || "[0..1]".into(), &[-2.0, -1.0])
            .unwrap_err();
        assert!(err.to_string().contains("predecessor list"));
        assert!(matches!(
            check_sorted(SortedList::Rules, String::new, &[f32::NAN, 0.0]),
            Err(DecodeError::InvalidScore { .. })
        ));
    }
}
