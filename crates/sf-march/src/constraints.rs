//! Step-size constraints derived from output requirements.

use crate::output::Output;

/// Maps `(t, dt)` to a possibly smaller step size. Constraints only ever
/// shrink a proposal; the loop takes the minimum over all of them.
pub type TimeStepConstraint = Box<dyn Fn(f64, f64) -> f64>;

/// Clamp `dt` so the step from `t` lands exactly on the next fixed time, if
/// one falls strictly inside the step. `fixed_times` must be sorted.
pub fn clamp_dt_to_next_fixed_time(t: f64, dt: f64, fixed_times: &[f64]) -> f64 {
    let eps = 1e-12 * t.abs().max(1.0);
    for &tf in fixed_times {
        // Skip times already reached.
        if tf < t + eps {
            continue;
        }
        if t + dt > tf {
            return tf - t;
        }
        break;
    }
    dt
}

/// Sorted, deduplicated union of all fixed output times.
pub(crate) fn unique_fixed_times(outputs: &[Box<dyn Output>]) -> Vec<f64> {
    let mut times: Vec<f64> = outputs
        .iter()
        .flat_map(|o| o.fixed_output_times())
        .collect();
    times.sort_by(|a, b| a.total_cmp(b));
    times.dedup();
    times
}

/// Constraints applied to every accepted step proposal: land on fixed output
/// times exactly, and never overshoot the end of the time interval.
pub(crate) fn output_time_constraints(
    fixed_times: Vec<f64>,
    end_time: f64,
) -> Vec<TimeStepConstraint> {
    vec![
        Box::new(move |t, dt| clamp_dt_to_next_fixed_time(t, dt, &fixed_times)),
        Box::new(move |t, dt| {
            if t < end_time && t + dt > end_time {
                end_time - t
            } else {
                dt
            }
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_to_first_upcoming_fixed_time() {
        let fixed = [0.3, 0.7];
        assert_eq!(clamp_dt_to_next_fixed_time(0.0, 0.5, &fixed), 0.3);
        // After 0.3 is reached, the next target applies.
        let dt = clamp_dt_to_next_fixed_time(0.3, 0.5, &fixed);
        assert!((dt - 0.4).abs() < 1e-12);
    }

    #[test]
    fn leaves_dt_alone_when_no_fixed_time_is_crossed() {
        let fixed = [0.7];
        assert_eq!(clamp_dt_to_next_fixed_time(0.0, 0.5, &fixed), 0.5);
        assert_eq!(clamp_dt_to_next_fixed_time(0.0, 0.5, &[]), 0.5);
    }

    #[test]
    fn skips_times_in_the_past() {
        let fixed = [0.1, 0.9];
        assert!((clamp_dt_to_next_fixed_time(0.5, 1.0, &fixed) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn end_time_constraint_prevents_overshoot() {
        let constraints = output_time_constraints(Vec::new(), 1.0);
        let clamp_end = &constraints[1];
        assert!((clamp_end(0.8, 0.5) - 0.2).abs() < 1e-12);
        assert_eq!(clamp_end(0.5, 0.3), 0.3);
        // Already at the end: no clamping to zero.
        assert_eq!(clamp_end(1.0, 0.3), 0.3);
    }
}
