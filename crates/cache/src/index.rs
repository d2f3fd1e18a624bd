//! Cell-centred mapping between slice positions and slot indices
//!
//! A stack of `N` slots divides the depth range `[zmin, zmax]` into `N`
//! equal cells. Slot `i` holds the slice rendered at the centre of cell
//! `i`, and an arbitrary depth position maps to the slot whose cell
//! contains it. The two directions are kept consistent so that a slot's
//! own position always maps back to that slot.

/// Tolerance, in cell units, for snapping positions that sit fractionally
/// outside the depth range onto the first or last cell.
const EDGE_SNAP: f64 = 0.01;

/// Maps depth positions to slot indices and back.
///
/// Immutable once built; the owning stack replaces its indexer whenever
/// the slice orientation or the display bounds change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceIndexer {
    zmin: f64,
    zmax: f64,
    len: usize,
}

impl SliceIndexer {
    /// Creates an indexer over `len` cells spanning `[zmin, zmax]`.
    ///
    /// Returns `None` for an empty stack or a degenerate range.
    pub fn new(zmin: f64, zmax: f64, len: usize) -> Option<Self> {
        if len == 0 || !(zmax > zmin) {
            return None;
        }
        Some(Self { zmin, zmax, len })
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.len
    }

    /// The depth range covered by the cells.
    pub fn range(&self) -> (f64, f64) {
        (self.zmin, self.zmax)
    }

    /// Width of one cell.
    pub fn step(&self) -> f64 {
        (self.zmax - self.zmin) / self.len as f64
    }

    /// The depth position at the centre of cell `index`.
    pub fn index_to_position(&self, index: usize) -> f64 {
        self.zmin + (index as f64 + 0.5) * self.step()
    }

    /// The cell containing the depth position `pos`.
    ///
    /// Positions fractionally outside the range snap onto the nearest end
    /// cell; positions further out are clamped. The result is always a
    /// valid index.
    pub fn position_to_index(&self, pos: f64) -> usize {
        let raw = (pos - self.zmin) / self.step();
        if raw.abs() < EDGE_SNAP {
            return 0;
        }
        if (raw - self.len as f64).abs() < EDGE_SNAP {
            return self.len - 1;
        }
        let cell = raw as i64;
        cell.clamp(0, self.len as i64 - 1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_new_rejects_degenerate() {
        assert!(SliceIndexer::new(0.0, 1.0, 0).is_none());
        assert!(SliceIndexer::new(1.0, 1.0, 4).is_none());
        assert!(SliceIndexer::new(2.0, 1.0, 4).is_none());
        assert!(SliceIndexer::new(0.0, f64::NAN, 4).is_none());
        assert!(SliceIndexer::new(0.0, 1.0, 1).is_some());
    }

    #[test]
    fn test_positions_are_cell_centres() {
        let indexer = SliceIndexer::new(0.0, 4.0, 4).unwrap();
        assert_eq!(indexer.step(), 1.0);
        assert_eq!(indexer.index_to_position(0), 0.5);
        assert_eq!(indexer.index_to_position(1), 1.5);
        assert_eq!(indexer.index_to_position(2), 2.5);
        assert_eq!(indexer.index_to_position(3), 3.5);
    }

    #[test]
    fn test_position_lookup() {
        let indexer = SliceIndexer::new(0.0, 4.0, 4).unwrap();
        assert_eq!(indexer.position_to_index(0.0), 0);
        assert_eq!(indexer.position_to_index(0.5), 0);
        assert_eq!(indexer.position_to_index(1.0), 1);
        assert_eq!(indexer.position_to_index(1.999), 1);
        assert_eq!(indexer.position_to_index(2.0), 2);
        assert_eq!(indexer.position_to_index(3.999), 3);
        assert_eq!(indexer.position_to_index(4.0), 3);
    }

    #[test]
    fn test_negative_range() {
        let indexer = SliceIndexer::new(-2.0, 2.0, 8).unwrap();
        assert_eq!(indexer.step(), 0.5);
        assert_eq!(indexer.index_to_position(0), -1.75);
        assert_eq!(indexer.index_to_position(7), 1.75);
        assert_eq!(indexer.position_to_index(-2.0), 0);
        assert_eq!(indexer.position_to_index(0.0), 4);
        assert_eq!(indexer.position_to_index(2.0), 7);
    }

    #[test]
    fn test_round_trip_is_exact() {
        for len in [1, 2, 7, 64, 256] {
            let indexer = SliceIndexer::new(-3.2, 11.7, len).unwrap();
            for i in 0..len {
                assert_eq!(
                    indexer.position_to_index(indexer.index_to_position(i)),
                    i,
                    "len={} i={}",
                    len,
                    i
                );
            }
        }
    }

    #[test]
    fn test_edge_snap_tolerance() {
        let indexer = SliceIndexer::new(0.0, 10.0, 10);
        let indexer = indexer.unwrap();
        let step = indexer.step();
        // Just outside either end, within the snap tolerance.
        assert_eq!(indexer.position_to_index(0.0 - 0.005 * step), 0);
        assert_eq!(indexer.position_to_index(10.0 + 0.005 * step), 9);
        // Outside the tolerance, clamped to the end cells.
        assert_eq!(indexer.position_to_index(-50.0), 0);
        assert_eq!(indexer.position_to_index(75.0), 9);
    }

    #[test]
    fn test_random_positions_stay_in_bounds() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let zmin: f64 = rng.gen_range(-100.0..100.0);
            let zmax = zmin + rng.gen_range(0.1..50.0);
            let len = rng.gen_range(1..300);
            let indexer = SliceIndexer::new(zmin, zmax, len).unwrap();
            let pos = rng.gen_range(zmin..zmax);
            let index = indexer.position_to_index(pos);
            assert!(index < len);
            // The slot centre lies within one cell of the queried position.
            let centre = indexer.index_to_position(index);
            assert!(
                (centre - pos).abs() <= indexer.step(),
                "pos={} centre={} step={}",
                pos,
                centre,
                indexer.step()
            );
        }
    }
}
