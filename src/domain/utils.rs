//! Small helpers shared by readers, tables and the diff

use crate::domain::repositories::CsvError;

/// Pick elements of `list` by index, in the order the indices are given
pub fn slice<T: Clone>(list: &[T], indices: &[usize]) -> Result<Vec<T>, CsvError> {
    indices
        .iter()
        .map(|&i| {
            list.get(i)
                .cloned()
                .ok_or_else(|| CsvError::invalid(format!("index {} is out of range for {} elements", i, list.len())))
        })
        .collect()
}

/// Join the values of a row with a separator, without any quoting
pub fn join_row(values: &[String], separator: char) -> String {
    let mut joined = String::new();
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            joined.push(separator);
        }
        joined.push_str(value);
    }
    joined
}

/// Smallest `r` with `r * r >= n`
pub fn ceil_sqrt(n: usize) -> usize {
    let mut root = (n as f64).sqrt() as usize;
    while root * root < n {
        root += 1;
    }
    while root > 0 && (root - 1) * (root - 1) >= n {
        root -= 1;
    }
    root
}
