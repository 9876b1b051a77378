use rayon::prelude::*;

use super::orb::Descriptor;

/// Correspondence between a query descriptor and its nearest train
/// descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureMatch {
    pub query: usize,
    pub train: usize,
    pub distance: u32,
}

#[inline]
pub fn hamming(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Brute-force nearest neighbour for every query descriptor, sorted by
/// ascending distance. Equal distances keep query order.
pub fn match_descriptors(query: &[Descriptor], train: &[Descriptor]) -> Vec<FeatureMatch> {
    if train.is_empty() {
        return Vec::new();
    }
    let mut matches: Vec<FeatureMatch> = query
        .par_iter()
        .enumerate()
        .filter_map(|(qi, q)| {
            train
                .iter()
                .enumerate()
                .map(|(ti, t)| (ti, hamming(q, t)))
                .min_by_key(|&(ti, d)| (d, ti))
                .map(|(ti, d)| FeatureMatch {
                    query: qi,
                    train: ti,
                    distance: d,
                })
        })
        .collect();
    matches.sort_by_key(|m| m.distance);
    matches
}

/// Keeps the best-ranked `keep_fraction` of an already sorted match list.
pub fn keep_best(mut matches: Vec<FeatureMatch>, keep_fraction: f32) -> Vec<FeatureMatch> {
    let percent = (keep_fraction.clamp(0.0, 1.0) * 100.0).round() as usize;
    let keep = matches.len() * percent / 100;
    matches.truncate(keep);
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(byte: u8) -> Descriptor {
        [byte; 32]
    }

    #[test]
    fn test_hamming() {
        assert_eq!(hamming(&desc(0), &desc(0)), 0);
        assert_eq!(hamming(&desc(0), &desc(0xFF)), 256);
        assert_eq!(hamming(&desc(0b1), &desc(0b11)), 32);
    }

    #[test]
    fn test_matches_sorted_by_distance() {
        let train = vec![desc(0x00), desc(0xF0)];
        let query = vec![desc(0xF1), desc(0x00), desc(0x0F)];
        let m = match_descriptors(&query, &train);
        assert_eq!(m.len(), 3);
        assert_eq!(m[0], FeatureMatch { query: 1, train: 0, distance: 0 });
        assert_eq!(m[1].query, 0);
        assert_eq!(m[1].train, 1);
        assert!(m.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_keep_best_truncates_to_80_percent() {
        let m: Vec<FeatureMatch> = (0..13)
            .map(|i| FeatureMatch {
                query: i,
                train: i,
                distance: i as u32,
            })
            .collect();
        let kept = keep_best(m, 0.8);
        assert_eq!(kept.len(), 10);
        assert_eq!(kept.last().map(|m| m.distance), Some(9));
    }
}
