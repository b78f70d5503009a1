/// Parabolic SAR (Wilder) evaluated over the whole series, returning the
/// value for the latest bar
///
/// `step` is the acceleration increment and `max` its cap. The initial trend
/// is taken from the direction of the first two bars' midpoints.
pub fn calculate_psar(highs: &[f64], lows: &[f64], step: f64, max: f64) -> Option<f64> {
    if highs.len() < 2 || highs.len() != lows.len() {
        return None;
    }

    let mut rising = highs[1] + lows[1] >= highs[0] + lows[0];
    let mut sar = if rising { lows[0] } else { highs[0] };
    let mut extreme = if rising { highs[0] } else { lows[0] };
    let mut af = step;

    for i in 1..highs.len() {
        let mut next = sar + af * (extreme - sar);

        if rising {
            // SAR never sits above the two prior lows
            next = next.min(lows[i - 1]);
            if i >= 2 {
                next = next.min(lows[i - 2]);
            }

            if lows[i] < next {
                rising = false;
                next = extreme;
                extreme = lows[i];
                af = step;
            } else if highs[i] > extreme {
                extreme = highs[i];
                af = (af + step).min(max);
            }
        } else {
            next = next.max(highs[i - 1]);
            if i >= 2 {
                next = next.max(highs[i - 2]);
            }

            if highs[i] > next {
                rising = true;
                next = extreme;
                extreme = highs[i];
                af = step;
            } else if lows[i] < extreme {
                extreme = lows[i];
                af = (af + step).min(max);
            }
        }

        sar = next;
    }

    Some(sar)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_psar_below_price_in_uptrend() {
        let highs: Vec<f64> = (0..50).map(|i| 101.0 + i as f64).collect();
        let lows: Vec<f64> = (0..50).map(|i| 99.0 + i as f64).collect();

        let psar = calculate_psar(&highs, &lows, 0.02, 0.2).unwrap();
        assert!(psar < *lows.last().unwrap());
    }

    #[test]
    fn test_psar_above_price_in_downtrend() {
        let highs: Vec<f64> = (0..50).map(|i| 201.0 - i as f64).collect();
        let lows: Vec<f64> = (0..50).map(|i| 199.0 - i as f64).collect();

        let psar = calculate_psar(&highs, &lows, 0.02, 0.2).unwrap();
        assert!(psar > *highs.last().unwrap());
    }

    #[test]
    fn test_psar_flips_on_reversal() {
        // 30 bars up, then a sharp sell-off
        let mut highs: Vec<f64> = (0..30).map(|i| 101.0 + i as f64).collect();
        let mut lows: Vec<f64> = (0..30).map(|i| 99.0 + i as f64).collect();
        for i in 0..10 {
            highs.push(125.0 - 5.0 * i as f64);
            lows.push(120.0 - 5.0 * i as f64);
        }

        let psar = calculate_psar(&highs, &lows, 0.02, 0.2).unwrap();
        assert!(psar > *highs.last().unwrap());
    }

    #[test]
    fn test_psar_needs_two_bars() {
        assert!(calculate_psar(&[1.0], &[0.5], 0.02, 0.2).is_none());
        assert!(calculate_psar(&[1.0, 2.0], &[0.5], 0.02, 0.2).is_none());
    }
}
