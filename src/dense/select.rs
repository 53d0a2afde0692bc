//! Order statistics by quickselect
//!
//! Hoare-style partitioning around a median-of-three pivot. Inputs are copied;
//! the caller's slice is never reordered.

use crate::error::{Error, Result};

fn reject_nan(values: &[f64]) -> Result<()> {
    if values.iter().any(|v| v.is_nan()) {
        return Err(Error::invalid_argument("values", "NaN has no order"));
    }
    Ok(())
}

/// Partially order `data` so that position `k` holds the k-th smallest value,
/// everything before it is `<=` and everything after is `>=`
fn quickselect_in_place(data: &mut [f64], k: usize) {
    let mut lo = 0;
    let mut hi = data.len() - 1;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        // Median of three moved to `mid`
        if data[mid] < data[lo] {
            data.swap(mid, lo);
        }
        if data[hi] < data[lo] {
            data.swap(hi, lo);
        }
        if data[hi] < data[mid] {
            data.swap(hi, mid);
        }
        let pivot = data[mid];

        let mut i = lo;
        let mut j = hi;
        loop {
            while data[i] < pivot {
                i += 1;
            }
            while data[j] > pivot {
                j -= 1;
            }
            if i >= j {
                break;
            }
            data.swap(i, j);
            i += 1;
            j -= 1;
        }

        // data[lo..=j] <= pivot <= data[j+1..=hi]
        if k <= j {
            hi = j;
        } else {
            lo = j + 1;
        }
    }
}

/// The `k` smallest values, in no particular order
pub fn select_k_smallest(values: &[f64], k: usize) -> Result<Vec<f64>> {
    reject_nan(values)?;
    if k > values.len() {
        return Err(Error::invalid_argument(
            "k",
            format!("k = {k} exceeds the {} available values", values.len()),
        ));
    }
    if k == 0 {
        return Ok(Vec::new());
    }
    let mut data = values.to_vec();
    quickselect_in_place(&mut data, k - 1);
    data.truncate(k);
    Ok(data)
}

/// The k-th smallest value (0-based)
pub fn partition_select(values: &[f64], k: usize) -> Result<f64> {
    reject_nan(values)?;
    if k >= values.len() {
        return Err(Error::invalid_argument(
            "k",
            format!("index {k} out of range for {} values", values.len()),
        ));
    }
    let mut data = values.to_vec();
    quickselect_in_place(&mut data, k);
    Ok(data[k])
}

/// Median; the mean of the two middle values for even lengths
pub fn median(values: &[f64]) -> Result<f64> {
    let n = values.len();
    if n == 0 {
        return Err(Error::invalid_argument("values", "median of an empty set"));
    }
    reject_nan(values)?;
    let mut data = values.to_vec();
    let upper = n / 2;
    quickselect_in_place(&mut data, upper);
    if n % 2 == 1 {
        return Ok(data[upper]);
    }
    // The lower middle is the maximum of the left part
    let lower = data[..upper].iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok((lower + data[upper]) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_k_smallest_scenario() {
        let mut picked = select_k_smallest(&[5.0, 2.0, 8.0, 1.0, 9.0, 3.0], 3).unwrap();
        picked.sort_by(f64::total_cmp);
        assert_eq!(picked, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_select_bounds() {
        assert!(select_k_smallest(&[1.0, 2.0], 3).is_err());
        assert!(select_k_smallest(&[1.0, 2.0], 0).unwrap().is_empty());
        assert!(partition_select(&[1.0], 1).is_err());
        assert!(select_k_smallest(&[1.0, f64::NAN], 1).is_err());
    }

    #[test]
    fn test_partition_select_matches_sort() {
        let values = [7.0, -1.0, 3.0, 3.0, 10.0, 0.5, 2.0, 3.0, -4.0];
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        for k in 0..values.len() {
            assert_eq!(partition_select(&values, k).unwrap(), sorted[k]);
        }
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]).unwrap(), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]).unwrap(), 2.5);
        assert!(median(&[]).is_err());
    }
}
