use chrono::{DateTime, Duration, Utc};
use petcare_core::TimerPayload;

use crate::types::FireTransition;

const MILLIS_PER_MINUTE: i64 = 60_000;

/// Compute when a reminder should next fire, never earlier than `now`.
///
/// - no due time: fire now
/// - due time in the future: fire at the due time
/// - due time reached, repeating: the first tick of `due_at + k * interval`
///   that is `>= now`; missed ticks collapse into that single one
/// - due time reached, one-shot: fire now rather than drop it
///
/// A zero or negative `repeat_minutes` counts as non-repeating.
pub fn next_fire_time(
    now: DateTime<Utc>,
    due_at: Option<DateTime<Utc>>,
    repeat_minutes: Option<i64>,
) -> DateTime<Utc> {
    let Some(due_at) = due_at else {
        return now;
    };
    if due_at > now {
        return due_at;
    }

    match interval_ms(repeat_minutes) {
        Some(interval) => {
            let delta = now.timestamp_millis() - due_at.timestamp_millis();
            // ceil(delta / interval); delta >= 0 here.
            let k = delta.div_euclid(interval) + i64::from(delta.rem_euclid(interval) != 0);
            k.checked_mul(interval)
                .and_then(|offset| due_at.checked_add_signed(Duration::milliseconds(offset)))
                .unwrap_or(now)
        }
        None => now,
    }
}

/// Delay from `now` until the next fire, clamped at zero.
pub fn delay_until_fire(
    now: DateTime<Utc>,
    due_at: Option<DateTime<Utc>>,
    repeat_minutes: Option<i64>,
) -> Duration {
    (next_fire_time(now, due_at, repeat_minutes) - now).max(Duration::zero())
}

/// Decide what happens to a timer after it fires at `fired_at`.
///
/// Repeating reminders re-arm `repeat_minutes` after the actual fire, not
/// after the ideal schedule, so late fires shift all later ticks.
pub fn fire_transition(payload: &TimerPayload, fired_at: DateTime<Utc>) -> FireTransition {
    match interval_ms(Some(payload.repeat_minutes)) {
        Some(interval) => match fired_at.checked_add_signed(Duration::milliseconds(interval)) {
            Some(fire_at) => FireTransition::Rearm { fire_at },
            None => FireTransition::Terminal,
        },
        None => FireTransition::Terminal,
    }
}

fn interval_ms(repeat_minutes: Option<i64>) -> Option<i64> {
    repeat_minutes
        .filter(|m| *m > 0)
        .and_then(|m| m.checked_mul(MILLIS_PER_MINUTE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use petcare_core::ReminderId;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn no_due_time_fires_now() {
        assert_eq!(next_fire_time(t0(), None, Some(30)), t0());
    }

    #[test]
    fn future_due_time_wins() {
        let due = t0() + Duration::minutes(10);
        assert_eq!(next_fire_time(t0(), Some(due), Some(30)), due);
        assert_eq!(next_fire_time(t0(), Some(due), None), due);
    }

    #[test]
    fn overdue_repeating_catches_up_to_one_tick() {
        let due = t0() - Duration::minutes(130);
        assert_eq!(
            next_fire_time(t0(), Some(due), Some(60)),
            t0() + Duration::minutes(50)
        );
    }

    #[test]
    fn due_exactly_now_fires_now() {
        assert_eq!(next_fire_time(t0(), Some(t0()), Some(60)), t0());
        assert_eq!(next_fire_time(t0(), Some(t0()), None), t0());
    }

    #[test]
    fn overdue_on_lattice_point_fires_now() {
        let due = t0() - Duration::minutes(120);
        assert_eq!(next_fire_time(t0(), Some(due), Some(60)), t0());
    }

    #[test]
    fn overdue_one_shot_fires_now() {
        let due = t0() - Duration::days(3);
        assert_eq!(next_fire_time(t0(), Some(due), None), t0());
    }

    #[test]
    fn zero_and_negative_repeat_are_one_shot() {
        let due = t0() - Duration::minutes(5);
        assert_eq!(next_fire_time(t0(), Some(due), Some(0)), t0());
        assert_eq!(next_fire_time(t0(), Some(due), Some(-15)), t0());
    }

    #[test]
    fn delay_is_never_negative() {
        let due = t0() - Duration::minutes(5);
        assert_eq!(delay_until_fire(t0(), Some(due), None), Duration::zero());
        assert_eq!(
            delay_until_fire(t0(), Some(t0() + Duration::minutes(3)), None),
            Duration::minutes(3)
        );
    }

    #[test]
    fn repeating_fire_rearms_from_actual_fire_time() {
        let payload = TimerPayload::new(ReminderId(1), "Feed", "x".into(), Some(45));
        let fired = t0() + Duration::seconds(17);
        assert_eq!(
            fire_transition(&payload, fired),
            FireTransition::Rearm {
                fire_at: fired + Duration::minutes(45)
            }
        );
    }

    #[test]
    fn one_shot_fire_is_terminal() {
        let payload = TimerPayload::new(ReminderId(1), "Vet", "x".into(), None);
        assert_eq!(fire_transition(&payload, t0()), FireTransition::Terminal);
    }
}
