//! Loading delimited source/target tables and feature preprocessing.
//!
//! Each input table is comma-delimited with one sample per row: the
//! feature values followed by a trailing integer label column.

use std::path::Path;

use nalgebra::DMatrix;

use crate::error::{AdaptError, Result};

/// Parse a delimited table into a row-per-sample feature matrix and the
/// raw (not yet re-based) label column.
pub fn load_table(path: &Path) -> Result<(DMatrix<f64>, Vec<i64>)> {
    let contents = std::fs::read_to_string(path)?;
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut labels: Vec<i64> = Vec::new();
    let mut width = None;

    for (line_no, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 2 {
            return Err(AdaptError::shape(format!(
                "{}:{}: expected at least one feature and a label column",
                path.display(),
                line_no + 1
            )));
        }

        match width {
            None => width = Some(fields.len()),
            Some(w) if w != fields.len() => {
                return Err(AdaptError::shape(format!(
                    "{}:{}: row has {} columns, expected {}",
                    path.display(),
                    line_no + 1,
                    fields.len(),
                    w
                )));
            }
            _ => {}
        }

        let mut parsed = Vec::with_capacity(fields.len() - 1);
        for (col, field) in fields.iter().enumerate() {
            let value: f64 = field.trim().parse().map_err(|_| {
                AdaptError::shape(format!(
                    "{}:{}: column {} is not numeric: '{}'",
                    path.display(),
                    line_no + 1,
                    col + 1,
                    field
                ))
            })?;
            if col + 1 == fields.len() {
                labels.push(value.round() as i64);
            } else {
                parsed.push(value);
            }
        }
        rows.push(parsed);
    }

    if rows.is_empty() {
        return Err(AdaptError::shape(format!(
            "{}: table contains no samples",
            path.display()
        )));
    }

    let d = rows[0].len();
    let features = DMatrix::from_fn(rows.len(), d, |i, j| rows[i][j]);
    Ok((features, labels))
}

/// Re-base raw labels to `1..=C` and return them alongside the class count.
///
/// If the minimum observed label across both domains is 0, every label is
/// shifted up by one. Any label outside `1..=C` afterwards is rejected.
pub fn rebase_labels(ys: &[i64], yt: &[i64]) -> Result<(Vec<usize>, Vec<usize>, usize)> {
    let min = ys.iter().chain(yt.iter()).copied().min().unwrap_or(1);
    let shift = if min == 0 { 1 } else { 0 };

    let mut classes: Vec<i64> = ys.iter().map(|&v| v + shift).collect();
    classes.sort_unstable();
    classes.dedup();
    let n_classes = classes.len();

    let check = |raw: &[i64], domain: &str| -> Result<Vec<usize>> {
        raw.iter()
            .map(|&v| {
                let v = v + shift;
                if v < 1 || v > n_classes as i64 {
                    Err(AdaptError::shape(format!(
                        "{} label {} outside 1..={}",
                        domain, v, n_classes
                    )))
                } else {
                    Ok(v as usize)
                }
            })
            .collect()
    };

    let ys = check(ys, "source")?;
    let yt = check(yt, "target")?;
    Ok((ys, yt, n_classes))
}

/// Z-score each feature using statistics over the stacked source+target
/// table, so both domains land on one scale before the joint kernel.
pub fn zscore_normalize(xs: &mut DMatrix<f64>, xt: &mut DMatrix<f64>) {
    let d = xs.ncols();
    let total = (xs.nrows() + xt.nrows()) as f64;

    for j in 0..d {
        let sum: f64 = xs.column(j).sum() + xt.column(j).sum();
        let mean = sum / total;
        let sq: f64 = xs
            .column(j)
            .iter()
            .chain(xt.column(j).iter())
            .map(|v| (v - mean).powi(2))
            .sum();
        let std = (sq / total).sqrt();
        let std = if std > 0.0 { std } else { 1.0 };

        for v in xs.column_mut(j).iter_mut() {
            *v = (*v - mean) / std;
        }
        for v in xt.column_mut(j).iter_mut() {
            *v = (*v - mean) / std;
        }
    }
}

/// Fraction of positions where `pred` agrees with `truth`.
pub fn accuracy(pred: &[usize], truth: &[usize]) -> f64 {
    if pred.is_empty() {
        return 0.0;
    }
    let hits = pred.iter().zip(truth).filter(|(a, b)| a == b).count();
    hits as f64 / pred.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_load_table() {
        let f = write_temp("1.0,2.0,1\n3.0,4.0,2\n");
        let (x, y) = load_table(f.path()).unwrap();
        assert_eq!(x.nrows(), 2);
        assert_eq!(x.ncols(), 2);
        assert_eq!(y, vec![1, 2]);
        assert_eq!(x[(1, 0)], 3.0);
    }

    #[test]
    fn test_load_table_rejects_ragged_rows() {
        let f = write_temp("1.0,2.0,1\n3.0,2\n");
        assert!(matches!(
            load_table(f.path()),
            Err(AdaptError::DataShapeMismatch(_))
        ));
    }

    #[test]
    fn test_load_table_rejects_non_numeric() {
        let f = write_temp("1.0,abc,1\n");
        assert!(matches!(
            load_table(f.path()),
            Err(AdaptError::DataShapeMismatch(_))
        ));
    }

    #[test]
    fn test_rebase_zero_based_labels() {
        let (ys, yt, c) = rebase_labels(&[0, 1, 0], &[1, 0]).unwrap();
        assert_eq!(c, 2);
        assert_eq!(ys, vec![1, 2, 1]);
        assert_eq!(yt, vec![2, 1]);
    }

    #[test]
    fn test_rebase_keeps_one_based_labels() {
        let (ys, yt, c) = rebase_labels(&[1, 2, 3], &[3, 1]).unwrap();
        assert_eq!(c, 3);
        assert_eq!(ys, vec![1, 2, 3]);
        assert_eq!(yt, vec![3, 1]);
    }

    #[test]
    fn test_rebase_rejects_out_of_range_target_label() {
        assert!(rebase_labels(&[1, 2], &[5]).is_err());
    }

    #[test]
    fn test_zscore_centers_features() {
        let mut xs = DMatrix::from_row_slice(2, 1, &[1.0, 3.0]);
        let mut xt = DMatrix::from_row_slice(2, 1, &[5.0, 7.0]);
        zscore_normalize(&mut xs, &mut xt);
        let mean = (xs.column(0).sum() + xt.column(0).sum()) / 4.0;
        assert!(mean.abs() < 1e-12);
    }

    #[test]
    fn test_accuracy() {
        assert_eq!(accuracy(&[1, 2, 3], &[1, 2, 1]), 2.0 / 3.0);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }
}
