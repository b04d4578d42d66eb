/// Credit-weighted grade point average of `(credit, grade_point)` pairs.
///
/// A term with no credits averages to `0.0`.
pub fn weighted_gpa(pairs: &[(f64, f64)]) -> f64 {
    let total_credits: f64 = pairs.iter().map(|(credit, _)| credit).sum();
    if total_credits <= 0.0 {
        return 0.0;
    }
    let total_points: f64 = pairs.iter().map(|(credit, point)| credit * point).sum();
    total_points / total_credits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_term_is_zero() {
        assert_eq!(weighted_gpa(&[]), 0.0);
    }

    #[test]
    fn weights_by_credit() {
        let gpa = weighted_gpa(&[(3.0, 4.0), (2.0, 3.0)]);
        assert!((gpa - 3.6).abs() < 1e-9);
    }

    #[test]
    fn zero_credit_courses_do_not_divide_by_zero() {
        assert_eq!(weighted_gpa(&[(0.0, 4.0), (0.0, 2.5)]), 0.0);
    }
}
