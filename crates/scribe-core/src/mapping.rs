//! Positional translation across document versions
//!
//! Every step describes how it moves positions as a [`StepMap`]; a
//! [`Mapping`] composes the maps of any number of steps so that a position
//! recorded against an older document version can be translated into the
//! current one. Comments and cursors are re-anchored through these values.
//!
//! Positions that fall inside a replaced range are clamped to the boundary
//! selected by [`Assoc`]; they are never dropped.

/// Which side of a replaced range a position sticks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Before,
    After,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MapRange {
    start: usize,
    old_size: usize,
    new_size: usize,
}

/// The positional effect of a single step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepMap {
    ranges: Vec<MapRange>,
}

impl StepMap {
    /// Build from `(start, old_size, new_size)` triples, ordered by start.
    pub fn new(ranges: Vec<(usize, usize, usize)>) -> Self {
        Self {
            ranges: ranges
                .into_iter()
                .map(|(start, old_size, new_size)| MapRange {
                    start,
                    old_size,
                    new_size,
                })
                .collect(),
        }
    }

    /// A map with no positional effect (mark changes).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn map(&self, pos: usize, assoc: Assoc) -> usize {
        let mut diff: isize = 0;
        for range in &self.ranges {
            if range.start > pos {
                break;
            }
            let end = range.start + range.old_size;
            if pos <= end {
                let side = if range.old_size == 0 {
                    assoc
                } else if pos == range.start {
                    Assoc::Before
                } else if pos == end {
                    Assoc::After
                } else {
                    assoc
                };
                let base = range.start as isize + diff;
                return match side {
                    Assoc::Before => base as usize,
                    Assoc::After => (base + range.new_size as isize) as usize,
                };
            }
            diff += range.new_size as isize - range.old_size as isize;
        }
        (pos as isize + diff) as usize
    }
}

/// An ordered composition of step maps.
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    maps: Vec<StepMap>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_maps(maps: Vec<StepMap>) -> Self {
        Self { maps }
    }

    pub fn append_map(&mut self, map: StepMap) {
        self.maps.push(map);
    }

    /// Compose with another mapping: `self` then `other`.
    pub fn append_mapping(&mut self, other: Mapping) {
        self.maps.extend(other.maps);
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn map(&self, pos: usize, assoc: Assoc) -> usize {
        self.maps.iter().fold(pos, |p, m| m.map(p, assoc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_shifts_later_positions() {
        // 3 characters inserted at 5
        let map = StepMap::new(vec![(5, 0, 3)]);
        assert_eq!(map.map(4, Assoc::After), 4);
        assert_eq!(map.map(6, Assoc::After), 9);
        assert_eq!(map.map(6, Assoc::Before), 9);
    }

    #[test]
    fn test_insertion_at_position_respects_assoc() {
        let map = StepMap::new(vec![(5, 0, 3)]);
        assert_eq!(map.map(5, Assoc::Before), 5);
        assert_eq!(map.map(5, Assoc::After), 8);
    }

    #[test]
    fn test_deletion_clamps_interior_positions() {
        // [5, 8) deleted
        let map = StepMap::new(vec![(5, 3, 0)]);
        assert_eq!(map.map(6, Assoc::Before), 5);
        assert_eq!(map.map(6, Assoc::After), 5);
        assert_eq!(map.map(5, Assoc::After), 5);
        assert_eq!(map.map(8, Assoc::Before), 5);
        assert_eq!(map.map(9, Assoc::Before), 6);
    }

    #[test]
    fn test_replacement_boundary_sides() {
        // [2, 6) replaced by 1 token
        let map = StepMap::new(vec![(2, 4, 1)]);
        assert_eq!(map.map(2, Assoc::After), 2);
        assert_eq!(map.map(6, Assoc::Before), 3);
        assert_eq!(map.map(4, Assoc::Before), 2);
        assert_eq!(map.map(4, Assoc::After), 3);
        assert_eq!(map.map(7, Assoc::Before), 4);
    }

    #[test]
    fn test_composition_applies_in_order() {
        let mut mapping = Mapping::new();
        mapping.append_map(StepMap::new(vec![(0, 0, 2)])); // +2 at start
        mapping.append_map(StepMap::new(vec![(10, 3, 0)])); // delete [10, 13)

        assert_eq!(mapping.map(5, Assoc::After), 7);
        // 9 -> 11 -> clamped to 10
        assert_eq!(mapping.map(9, Assoc::Before), 10);

        let mut other = Mapping::new();
        other.append_map(StepMap::new(vec![(0, 0, 1)]));
        mapping.append_mapping(other);
        assert_eq!(mapping.map(5, Assoc::After), 8);
    }
}
