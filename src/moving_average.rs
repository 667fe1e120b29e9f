//! Centered moving average over a series with gaps.
//! Absent inputs stay absent and are skipped when averaging their neighbours.
//! An even window leans backwards: `window_size / 2` before, one fewer after.
pub fn moving_average(values: &[Option<f64>], window_size: i64) -> Vec<Option<f64>> {
    if window_size <= 0 || values.is_empty() {
        return values.to_vec();
    }

    let window = window_size as usize;
    let before = window / 2;
    let after = window - 1 - before;
    let last = values.len() - 1;

    values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            value.map(|_| {
                let start = i.saturating_sub(before);
                let end = (i + after).min(last);
                let present: Vec<f64> = values[start..=end].iter().flatten().copied().collect();
                present.iter().sum::<f64>() / present.len() as f64
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_window() {
        let input = vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0)];
        let output = moving_average(&input, 3);

        assert_eq!(output[0], Some(1.5)); // clamped at the start
        assert_eq!(output[1], Some(2.0));
        assert_eq!(output[2], Some(3.0));
        assert_eq!(output[4], Some(4.5));
    }

    #[test]
    fn test_gaps_are_skipped_and_kept() {
        let input = vec![Some(2.0), None, Some(4.0), Some(6.0)];
        let output = moving_average(&input, 3);

        assert_eq!(output[1], None);
        assert_eq!(output[0], Some(2.0));
        assert_eq!(output[2], Some(5.0));
        assert_eq!(output[3], Some(5.0));
    }

    #[test]
    fn test_even_window_leans_backwards() {
        let input = vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0)];
        let output = moving_average(&input, 4);

        // indices 0..=3 around position 2
        assert_eq!(output[2], Some(2.5));
        assert_eq!(output[4], Some(4.0));
    }

    #[test]
    fn test_non_positive_window_is_passthrough() {
        let input = vec![Some(1.0), None, Some(9.0)];
        assert_eq!(moving_average(&input, 0), input);
        assert_eq!(moving_average(&input, -3), input);
        assert_eq!(moving_average(&input, 1), input);
    }
}
