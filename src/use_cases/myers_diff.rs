//! Row diff of two tables with Myers' O(ND) algorithm
//!
//! Rows are compared on key columns only, each parsed as its key type, so `007`
//! and `7` are equal under a LONG key.

use crate::domain::entities::{KeyType, KeyValue};
use crate::domain::repositories::CsvError;
use crate::domain::table::CsvTable;
use crate::domain::utils::join_row;
use std::fmt;
use std::io::Write;

/// A column that takes part in row equality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffKey {
    pub field: usize,
    pub key_type: KeyType,
}

impl DiffKey {
    pub fn new(field: usize, key_type: KeyType) -> Self {
        Self { field, key_type }
    }
}

/// One step of the edit path; indices point into the first or second table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOperation {
    Take(usize),
    Delete(usize),
    Add(usize),
}

impl DiffOperation {
    /// The row this operation refers to, joined with commas
    pub fn content(&self, first: &CsvTable, second: &CsvTable) -> Result<String, CsvError> {
        let (table, row) = match *self {
            DiffOperation::Take(row) | DiffOperation::Delete(row) => (first, row),
            DiffOperation::Add(row) => (second, row),
        };
        table
            .row(row)
            .map(|values| join_row(values, ','))
            .ok_or_else(|| CsvError::invalid(format!("diff refers to missing row {}", row)))
    }
}

impl fmt::Display for DiffOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiffOperation::Take(_) => "TAKE",
            DiffOperation::Delete(_) => "DELETE",
            DiffOperation::Add(_) => "ADD",
        };
        f.write_str(name)
    }
}

pub struct MyersDiff {
    keys: Vec<DiffKey>,
}

impl MyersDiff {
    pub fn new(keys: Vec<DiffKey>) -> Result<Self, CsvError> {
        if keys.is_empty() {
            return Err(CsvError::invalid("diff needs at least one key column"));
        }
        Ok(Self { keys })
    }

    fn row_keys(&self, table: &CsvTable) -> Result<Vec<Vec<KeyValue>>, CsvError> {
        table
            .rows()
            .iter()
            .map(|row| {
                self.keys
                    .iter()
                    .map(|key| {
                        let value = row.get(key.field).ok_or_else(|| {
                            CsvError::invalid(format!("key column {} is missing, rows have {} columns", key.field, row.len()))
                        })?;
                        key.key_type.parse(value)
                    })
                    .collect()
            })
            .collect()
    }

    /// Shortest edit path from `first` to `second`
    pub fn operations(&self, first: &CsvTable, second: &CsvTable) -> Result<Vec<DiffOperation>, CsvError> {
        let a = self.row_keys(first)?;
        let b = self.row_keys(second)?;
        let path = shortest_path(&a, &b);

        let mut operations = Vec::with_capacity(path.len());
        let mut prev = path[0];
        for &next in &path[1..] {
            if next == prev {
                continue;
            }
            let op = if prev.0 < next.0 && prev.1 < next.1 {
                DiffOperation::Take(prev.0 as usize)
            } else if prev.0 < next.0 {
                DiffOperation::Delete(prev.0 as usize)
            } else {
                DiffOperation::Add(prev.1 as usize)
            };
            operations.push(op);
            prev = next;
        }
        Ok(operations)
    }

    /// Print every operation as `TYPE row`
    pub fn diff<W: Write + ?Sized>(&self, first: &CsvTable, second: &CsvTable, out: &mut W) -> Result<(), CsvError> {
        for op in self.operations(first, second)? {
            writeln!(out, "{} {}", op, op.content(first, second)?)?;
        }
        Ok(())
    }

    /// Print an `ed` style script turning `first` into `second`, last line first
    pub fn edit_script<W: Write + ?Sized>(
        &self,
        first: &CsvTable,
        second: &CsvTable,
        out: &mut W,
    ) -> Result<(), CsvError> {
        let mut line = first.len();
        for op in self.operations(first, second)?.iter().rev() {
            match op {
                DiffOperation::Take(_) => line -= 1,
                DiffOperation::Delete(_) => {
                    writeln!(out, "{}d", line)?;
                    line -= 1;
                }
                DiffOperation::Add(_) => {
                    writeln!(out, "{}a", line)?;
                    writeln!(out, "{}", op.content(first, second)?)?;
                    writeln!(out, ".")?;
                }
            }
        }
        Ok(())
    }
}

type Point = (isize, isize);

/// Greedy forward search over diagonals; `steps[d]` snapshots the furthest x
/// reached on every diagonal after `d` edits
fn shortest_path(a: &[Vec<KeyValue>], b: &[Vec<KeyValue>]) -> Vec<Point> {
    let (n, m) = (a.len() as isize, b.len() as isize);
    let max = n + m;
    let offset = max + 1;
    let at = |k: isize| (k + offset) as usize;

    let mut v = vec![0isize; (2 * max + 3) as usize];
    let mut steps: Vec<Vec<isize>> = Vec::new();
    let (mut d_end, mut k_end) = (0, 0);

    'search: for d in 0..=max {
        for k in (-d..=d).step_by(2) {
            let down = k == -d || (k != d && v[at(k - 1)] < v[at(k + 1)]);
            let mut x = if down { v[at(k + 1)] } else { v[at(k - 1)] + 1 };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[at(k)] = x;
            if x >= n && y >= m {
                d_end = d;
                k_end = k;
                steps.push(v.clone());
                break 'search;
            }
        }
        steps.push(v.clone());
    }

    let mut k = k_end;
    let x = steps[d_end as usize][at(k)];
    let mut path = vec![(x, x - k)];
    for d in (1..=d_end).rev() {
        if k == -d {
            k += 1;
        } else if k == d {
            k -= 1;
        } else if steps[(d - 1) as usize][at(k - 1)] < steps[(d - 1) as usize][at(k + 1)] {
            k += 1;
        } else {
            k -= 1;
        }
        let x = steps[d as usize][at(k)];
        walk_back_to((x, x - k), &mut path);
    }
    walk_back_to((0, 0), &mut path);
    path.reverse();
    path
}

/// Extend `path` from its last point back to `target`, diagonals first
fn walk_back_to(target: Point, path: &mut Vec<Point>) {
    let (x, y) = target;
    let Some(&(mut x_prev, mut y_prev)) = path.last() else {
        return;
    };
    while x != x_prev || y != y_prev {
        if x < x_prev && y < y_prev {
            x_prev -= 1;
            y_prev -= 1;
        } else if x < x_prev {
            x_prev -= 1;
        } else {
            y_prev -= 1;
        }
        path.push((x_prev, y_prev));
    }
}
