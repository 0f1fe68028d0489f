/// Generate a Euclidean rhythm using Bjorklund's algorithm.
/// Returns `steps` cells with `hits` of them spread as evenly as possible.
/// Degenerate input (no hits, no steps, more hits than steps) yields silence.
pub fn euclidean_rhythm(hits: usize, steps: usize) -> Vec<bool> {
    if hits == 0 || steps == 0 || hits > steps {
        return vec![false; steps];
    }
    if hits == steps {
        return vec![true; steps];
    }

    let mut pattern: Vec<Vec<bool>> = vec![vec![true]; hits];
    let mut remainder: Vec<Vec<bool>> = vec![vec![false]; steps - hits];

    while remainder.len() > 1 {
        let paired = pattern.len().min(remainder.len());
        let mut joined = Vec::with_capacity(paired);
        for i in 0..paired {
            let mut group = pattern[i].clone();
            group.extend_from_slice(&remainder[i]);
            joined.push(group);
        }
        let rest = if pattern.len() > paired {
            pattern.split_off(paired)
        } else {
            remainder.split_off(paired)
        };
        pattern = joined;
        remainder = rest;
    }

    let mut result: Vec<bool> = pattern.into_iter().chain(remainder).flatten().collect();
    result.truncate(steps);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: bool = true;
    const F: bool = false;

    #[test]
    fn three_of_eight() {
        assert_eq!(euclidean_rhythm(3, 8), vec![T, F, F, T, F, F, T, F]);
    }

    #[test]
    fn five_of_eight() {
        assert_eq!(euclidean_rhythm(5, 8), vec![T, F, T, T, F, T, T, F]);
    }

    #[test]
    fn degenerate_inputs_are_silent() {
        assert_eq!(euclidean_rhythm(0, 8), vec![F; 8]);
        assert_eq!(euclidean_rhythm(9, 8), vec![F; 8]);
        assert!(euclidean_rhythm(0, 0).is_empty());
        assert!(euclidean_rhythm(3, 0).is_empty());
    }

    #[test]
    fn every_step_a_hit() {
        assert_eq!(euclidean_rhythm(4, 4), vec![T; 4]);
    }

    #[test]
    fn hit_count_preserved() {
        for steps in 1..=16 {
            for hits in 1..=steps {
                let rhythm = euclidean_rhythm(hits, steps);
                assert_eq!(rhythm.len(), steps);
                assert_eq!(rhythm.iter().filter(|&&h| h).count(), hits);
                assert!(rhythm[0]);
            }
        }
    }
}
