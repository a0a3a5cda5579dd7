//! Position mapping across steps.
use crate::model::util;
use std::ops::RangeBounds;

/// Which side of an insertion or deletion a position sticks to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Assoc {
    /// Stay before inserted content
    Before,
    /// Move along with inserted content
    #[default]
    After,
}

impl Assoc {
    fn is_before(self) -> bool {
        self == Assoc::Before
    }
}

const FACTOR_16: usize = 1 << 16;

fn make_recover(index: usize, offset: usize) -> usize {
    index + offset * FACTOR_16
}

fn recover_index(value: usize) -> usize {
    value % FACTOR_16
}

fn recover_offset(value: usize) -> usize {
    (value - recover_index(value)) / FACTOR_16
}

const DEL_BEFORE: u8 = 1;
const DEL_AFTER: u8 = 2;
const DEL_ACROSS: u8 = 4;
const DEL_SIDE: u8 = 8;

/// An object representing a mapped position with extra information.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MapResult {
    /// The mapped version of the position.
    pub pos: usize,
    del_info: u8,
    /// A token to recover the position through a mirrored map.
    pub recover: Option<usize>,
}

impl MapResult {
    fn new(pos: usize, del_info: u8, recover: Option<usize>) -> Self {
        Self {
            pos,
            del_info,
            recover,
        }
    }

    /// Tells you whether the position was deleted, that is, whether the step removed the token
    /// on the side queried (via the `assoc`) argument from the document.
    pub fn deleted(&self) -> bool {
        self.del_info & DEL_SIDE > 0
    }

    /// Tells you whether the token before the mapped position was deleted.
    pub fn deleted_before(&self) -> bool {
        self.del_info & (DEL_BEFORE | DEL_ACROSS) > 0
    }

    /// True when the token after the mapped position was deleted.
    pub fn deleted_after(&self) -> bool {
        self.del_info & (DEL_AFTER | DEL_ACROSS) > 0
    }

    /// Tells whether any of the steps mapped through deletes across the position (including
    /// both the token before and after the position).
    pub fn deleted_across(&self) -> bool {
        self.del_info & DEL_ACROSS > 0
    }
}

/// There are several things that positions can be mapped through. Such objects conform to
/// this interface.
pub trait Mappable {
    /// Map a position through this object. When given, `assoc` determines which side the
    /// position is associated with, which determines in which direction to move when a chunk
    /// of content is inserted at the mapped position.
    fn map(&self, pos: usize, assoc: Assoc) -> usize;

    /// Map a position, and return an object containing additional information about the
    /// mapping.
    fn map_result(&self, pos: usize, assoc: Assoc) -> MapResult;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, new)]
struct MapRange {
    start: usize,
    old_size: usize,
    new_size: usize,
}

impl MapRange {
    fn sizes(&self, inverted: bool) -> (usize, usize) {
        if inverted {
            (self.new_size, self.old_size)
        } else {
            (self.old_size, self.new_size)
        }
    }

    fn delta(&self, inverted: bool) -> isize {
        let (old_size, new_size) = self.sizes(inverted);
        new_size as isize - old_size as isize
    }
}

fn shift(pos: usize, diff: isize) -> usize {
    (pos as isize + diff) as usize
}

/// A map describing the deletions and insertions made by a step, which can be used to find
/// the correspondence between positions in the pre-step version of a document and the same
/// position in the post-step version.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StepMap {
    ranges: Vec<MapRange>,
    inverted: bool,
}

impl StepMap {
    /// Create a position map from `(start, old_size, new_size)` triples. The ranges must be
    /// sorted by start position.
    pub fn new(ranges: &[(usize, usize, usize)], inverted: bool) -> StepMap {
        StepMap {
            ranges: ranges
                .iter()
                .map(|&(start, old_size, new_size)| MapRange::new(start, old_size, new_size))
                .collect(),
            inverted,
        }
    }

    /// A step map that contains no changed ranges.
    pub fn empty() -> StepMap {
        StepMap::default()
    }

    /// Create a map that moves all positions by offset `n` (which may be negative). This can
    /// be useful when applying steps meant for a sub-document to a larger document, or
    /// vice-versa.
    pub fn offset(n: isize) -> StepMap {
        match n {
            0 => StepMap::empty(),
            n if n < 0 => StepMap::new(&[(0, n.unsigned_abs(), 0)], false),
            n => StepMap::new(&[(0, 0, n as usize)], false),
        }
    }

    /// Whether this map changes nothing.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Recover a position from a token produced by a mirrored map.
    pub fn recover(&self, value: usize) -> usize {
        let index = recover_index(value);
        let mut diff = 0;
        if !self.inverted {
            for range in &self.ranges[..index] {
                diff += range.delta(false);
            }
        }
        shift(self.ranges[index].start, diff) + recover_offset(value)
    }

    fn map_inner(&self, pos: usize, assoc: Assoc) -> MapResult {
        let mut diff: isize = 0;
        for (i, range) in self.ranges.iter().enumerate() {
            let start = if self.inverted {
                shift(range.start, -diff)
            } else {
                range.start
            };
            if start > pos {
                break;
            }
            let (old_size, new_size) = range.sizes(self.inverted);
            let end = start + old_size;
            if pos <= end {
                let before = if old_size == 0 {
                    assoc.is_before()
                } else if pos == start {
                    true
                } else if pos == end {
                    false
                } else {
                    assoc.is_before()
                };
                let result = shift(start, diff) + if before { 0 } else { new_size };
                let bound = if assoc.is_before() { start } else { end };
                let recover = if pos == bound {
                    None
                } else {
                    Some(make_recover(i, pos - start))
                };
                let mut del = if pos == start {
                    DEL_AFTER
                } else if pos == end {
                    DEL_BEFORE
                } else {
                    DEL_ACROSS
                };
                if pos != bound {
                    del |= DEL_SIDE;
                }
                return MapResult::new(result, del, recover);
            }
            diff += new_size as isize - old_size as isize;
        }
        MapResult::new(shift(pos, diff), 0, None)
    }

    /// Whether the range identified by the recover token touches the given position.
    pub fn touches(&self, pos: usize, recover: usize) -> bool {
        let index = recover_index(recover);
        let mut diff: isize = 0;
        for (i, range) in self.ranges.iter().enumerate() {
            let start = if self.inverted {
                shift(range.start, -diff)
            } else {
                range.start
            };
            if start > pos {
                break;
            }
            let (old_size, _) = range.sizes(self.inverted);
            if pos <= start + old_size && i == index {
                return true;
            }
            diff += range.delta(self.inverted);
        }
        false
    }

    /// Calls the given function on each of the changed ranges included in this map, with
    /// `(old_start, old_end, new_start, new_end)`.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(usize, usize, usize, usize),
    {
        let mut diff: isize = 0;
        for range in &self.ranges {
            let (old_start, new_start) = if self.inverted {
                (shift(range.start, -diff), range.start)
            } else {
                (range.start, shift(range.start, diff))
            };
            let (old_size, new_size) = range.sizes(self.inverted);
            f(old_start, old_start + old_size, new_start, new_start + new_size);
            diff += new_size as isize - old_size as isize;
        }
    }

    /// Create an inverted version of this map. The result can be used to map positions in the
    /// post-step document to the pre-step document.
    pub fn invert(&self) -> StepMap {
        StepMap {
            ranges: self.ranges.clone(),
            inverted: !self.inverted,
        }
    }
}

impl Mappable for StepMap {
    fn map(&self, pos: usize, assoc: Assoc) -> usize {
        self.map_inner(pos, assoc).pos
    }

    fn map_result(&self, pos: usize, assoc: Assoc) -> MapResult {
        self.map_inner(pos, assoc)
    }
}

/// A mapping represents a pipeline of zero or more step maps. It has special provisions for
/// losslessly handling mapping positions through a series of steps in which some steps are
/// inverted versions of earlier steps. (This comes up when 'rebasing' steps for collaboration
/// or history management.)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mapping {
    maps: Vec<StepMap>,
    mirror: Vec<(usize, usize)>,
    from: usize,
    to: usize,
}

impl Mapping {
    /// Create a new, empty mapping.
    pub fn new() -> Mapping {
        Mapping::default()
    }

    /// Create a mapping over the given step maps.
    pub fn from_maps(maps: Vec<StepMap>) -> Mapping {
        let to = maps.len();
        Mapping {
            maps,
            mirror: Vec::new(),
            from: 0,
            to,
        }
    }

    /// The step maps in this mapping.
    pub fn maps(&self) -> &[StepMap] {
        &self.maps
    }

    /// The starting position in the `maps` array, used when `map` or `map_result` is called.
    pub fn from(&self) -> usize {
        self.from
    }

    /// The end position in the `maps` array.
    pub fn to(&self) -> usize {
        self.to
    }

    /// Create a mapping that maps only through a part of this one.
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> Mapping {
        Mapping {
            maps: self.maps.clone(),
            mirror: self.mirror.clone(),
            from: util::from(&range),
            to: util::to(&range, self.maps.len()),
        }
    }

    /// Add a step map to the end of this mapping. If `mirrors` is given, it should be the
    /// index of the step map that is the mirror image of this one.
    pub fn append_map(&mut self, map: StepMap, mirrors: Option<usize>) {
        self.maps.push(map);
        self.to = self.maps.len();
        if let Some(m) = mirrors {
            self.set_mirror(self.maps.len() - 1, m);
        }
    }

    /// Add all the step maps in a given mapping to this one (preserving mirroring
    /// information).
    pub fn append_mapping(&mut self, mapping: &Mapping) {
        let start_size = self.maps.len();
        for (i, map) in mapping.maps.iter().enumerate() {
            let mirror = mapping.get_mirror(i).filter(|&m| m < i);
            self.append_map(map.clone(), mirror.map(|m| start_size + m));
        }
    }

    /// Finds the offset of the step map that mirrors the map at the given offset, in this
    /// mapping.
    pub fn get_mirror(&self, n: usize) -> Option<usize> {
        self.mirror.iter().find_map(|&(a, b)| {
            if a == n {
                Some(b)
            } else if b == n {
                Some(a)
            } else {
                None
            }
        })
    }

    /// Record that the maps at offsets `n` and `m` are exact inverses of each other.
    pub fn set_mirror(&mut self, n: usize, m: usize) {
        self.mirror.push((n, m));
    }

    /// Append the inverse of the given mapping to this one.
    pub fn append_mapping_inverted(&mut self, mapping: &Mapping) {
        let total_size = self.maps.len() + mapping.maps.len();
        for (i, map) in mapping.maps.iter().enumerate().rev() {
            let mirror = mapping.get_mirror(i).filter(|&m| m > i);
            self.append_map(map.invert(), mirror.map(|m| total_size - m - 1));
        }
    }

    /// Create an inverted version of this mapping.
    pub fn invert(&self) -> Mapping {
        let mut inverse = Mapping::new();
        inverse.append_mapping_inverted(self);
        inverse
    }

    fn map_inner(&self, pos: usize, assoc: Assoc) -> MapResult {
        let mut del_info = 0;
        let mut pos = pos;
        let mut i = self.from;
        while i < self.to {
            let result = self.maps[i].map_result(pos, assoc);
            if let Some(recover) = result.recover {
                if let Some(corr) = self.get_mirror(i).filter(|&c| c > i && c < self.to) {
                    pos = self.maps[corr].recover(recover);
                    i = corr + 1;
                    continue;
                }
            }
            del_info |= result.del_info;
            pos = result.pos;
            i += 1;
        }
        MapResult::new(pos, del_info, None)
    }
}

impl Mappable for Mapping {
    fn map(&self, pos: usize, assoc: Assoc) -> usize {
        if self.mirror.is_empty() {
            return self.maps[self.from..self.to]
                .iter()
                .fold(pos, |pos, map| map.map(pos, assoc));
        }
        self.map_inner(pos, assoc).pos
    }

    fn map_result(&self, pos: usize, assoc: Assoc) -> MapResult {
        self.map_inner(pos, assoc)
    }
}

#[cfg(test)]
mod tests {
    use super::{Assoc, Mappable, Mapping, StepMap};

    fn mk(maps: &[(usize, usize, usize)], mirrors: &[(usize, usize)]) -> Mapping {
        let mut mapping = Mapping::new();
        for &range in maps {
            mapping.append_map(StepMap::new(&[range], false), None);
        }
        for &(a, b) in mirrors {
            mapping.set_mirror(a, b);
        }
        mapping
    }

    fn check(mapping: &Mapping, cases: &[(usize, usize)]) {
        let inverted = mapping.invert();
        for &(from, to) in cases {
            assert_eq!(mapping.map(from, Assoc::After), to, "mapping {}", from);
            assert_eq!(inverted.map(to, Assoc::After), from, "inverse of {}", to);
        }
    }

    #[test]
    fn maps_through_a_single_insertion() {
        check(&mk(&[(2, 0, 4)], &[]), &[(0, 0), (2, 6), (3, 7)]);
    }

    #[test]
    fn maps_through_a_single_deletion() {
        let mapping = mk(&[(2, 4, 0)], &[]);
        assert_eq!(mapping.map(0, Assoc::After), 0);
        assert_eq!(mapping.map(2, Assoc::Before), 2);
        assert_eq!(mapping.map(2, Assoc::After), 2);
        assert_eq!(mapping.map(3, Assoc::After), 2);
        assert_eq!(mapping.map(6, Assoc::After), 2);
        assert_eq!(mapping.map(7, Assoc::After), 3);
    }

    #[test]
    fn maps_through_a_replacement() {
        let mapping = mk(&[(2, 4, 4)], &[]);
        assert_eq!(mapping.map(0, Assoc::After), 0);
        assert_eq!(mapping.map(2, Assoc::After), 2);
        assert_eq!(mapping.map(4, Assoc::After), 6);
        assert_eq!(mapping.map(4, Assoc::Before), 2);
        assert_eq!(mapping.map(6, Assoc::After), 6);
        assert_eq!(mapping.map(8, Assoc::After), 8);
    }

    #[test]
    fn maps_through_a_mirrored_deletion_and_insertion() {
        check(
            &mk(&[(2, 4, 0), (2, 0, 4)], &[(0, 1)]),
            &[(0, 0), (2, 2), (4, 4), (6, 6), (7, 7)],
        );
    }

    #[test]
    fn maps_through_a_mirrored_insertion_and_deletion() {
        check(
            &mk(&[(2, 0, 4), (2, 4, 0)], &[(0, 1)]),
            &[(0, 0), (2, 2), (3, 3)],
        );
    }

    #[test]
    fn maps_through_a_delete_insert_with_an_insert_in_between() {
        check(
            &mk(&[(2, 4, 0), (1, 0, 1), (3, 0, 4)], &[(0, 2)]),
            &[(0, 0), (1, 2), (4, 5), (6, 7), (7, 8)],
        );
    }

    #[test]
    fn reports_deleted_sides() {
        let map = StepMap::new(&[(2, 4, 0)], false);
        let inside = map.map_result(4, Assoc::After);
        assert!(inside.deleted());
        assert!(inside.deleted_across());
        assert_eq!(inside.pos, 2);
        let start = map.map_result(2, Assoc::After);
        assert!(start.deleted());
        assert!(start.deleted_after());
        assert!(!start.deleted_before());
        let start_before = map.map_result(2, Assoc::Before);
        assert!(!start_before.deleted());
        let end = map.map_result(6, Assoc::Before);
        assert!(end.deleted());
        assert!(end.deleted_before());
        assert!(!end.deleted_after());
        assert!(!map.map_result(8, Assoc::After).deleted());
    }

    #[test]
    fn offsets_shift_everything() {
        assert_eq!(StepMap::offset(3).map(4, Assoc::After), 7);
        assert_eq!(StepMap::offset(-2).map(4, Assoc::After), 2);
        assert!(StepMap::offset(0).is_empty());
    }

    #[test]
    fn iterates_changed_ranges() {
        let map = StepMap::new(&[(2, 4, 0), (10, 0, 3)], false);
        let mut seen = vec![];
        map.for_each(|a, b, c, d| seen.push((a, b, c, d)));
        assert_eq!(seen, vec![(2, 6, 2, 2), (10, 10, 6, 9)]);
        let mut inverted = vec![];
        map.invert().for_each(|a, b, c, d| inverted.push((a, b, c, d)));
        assert_eq!(inverted, vec![(2, 2, 2, 6), (6, 9, 10, 10)]);
    }

    #[test]
    fn recovers_and_touches() {
        let map = StepMap::new(&[(2, 4, 0), (10, 2, 5)], false);
        let result = map.map_result(11, Assoc::After);
        let token = result.recover.unwrap();
        assert!(map.touches(11, token));
        assert!(!map.touches(4, token));
        assert_eq!(map.recover(token), 7);
    }

    #[test]
    fn slices_and_appends_mappings() {
        let mapping = mk(&[(0, 0, 2), (4, 0, 3)], &[]);
        assert_eq!(mapping.slice(1..).map(5, Assoc::After), 8);
        assert_eq!(mapping.slice(..1).map(5, Assoc::After), 7);

        let mut joined = mk(&[(2, 4, 0)], &[]);
        joined.append_mapping(&mk(&[(2, 0, 4)], &[]));
        assert_eq!(joined.maps().len(), 2);
        assert_eq!(joined.get_mirror(1), None);
        joined.set_mirror(0, 1);
        let mut outer = Mapping::new();
        outer.append_mapping(&joined);
        assert_eq!(outer.get_mirror(1), Some(0));
        assert_eq!(outer.map(4, Assoc::After), 4);
    }
}
