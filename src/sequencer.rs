//! Boustrophedon ("snake") traversal over the grid.
//!
//! Rows are swept alternately left-to-right and right-to-left so the whole
//! grid is covered in a single continuous path with one-cell steps.

use crate::model::{Coord, GridSize, SweepDirection};

/// The sequencer's answer for one iteration: the next target cell plus the
/// updated sweep cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub position: Coord,
    pub row: u32,
    pub direction: SweepDirection,
}

/// Compute the next coordinate after `position`, or `None` once the sweep has
/// run off the bottom of the grid.
pub fn advance(
    position: Coord,
    row: u32,
    direction: SweepDirection,
    grid: GridSize,
) -> Option<Step> {
    match direction {
        SweepDirection::Forward if position.x < grid.width => Some(Step {
            position: Coord::new(position.x + 1, row),
            row,
            direction,
        }),
        SweepDirection::Forward => {
            // Right edge: drop one row, sweep back. Column stays put.
            let next_row = row + 1;
            if next_row > grid.height {
                return None;
            }
            Some(Step {
                position: Coord::new(position.x, next_row),
                row: next_row,
                direction: SweepDirection::Backward,
            })
        }
        SweepDirection::Backward if position.x > 1 => Some(Step {
            position: Coord::new(position.x - 1, row),
            row,
            direction,
        }),
        SweepDirection::Backward => {
            let next_row = row + 1;
            if next_row > grid.height {
                return None;
            }
            Some(Step {
                position: Coord::new(1, next_row),
                row: next_row,
                direction: SweepDirection::Forward,
            })
        }
    }
}
