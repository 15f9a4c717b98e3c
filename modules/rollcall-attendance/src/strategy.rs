//! Strategy selection. Chosen once when the session list is finalized and
//! stored on the event; never inferred at outcome time.

use rollcall_common::{AttendanceStrategy, Session, SessionKind};

/// Weights closer than this are treated as uniform.
const WEIGHT_EPSILON: f64 = 1e-9;

/// Derive the attendance strategy from the shape of the session list.
///
/// A mandatory milestone session always gates the outcome, whatever the
/// weight distribution looks like. Otherwise: one session is a binary
/// check, equal weights count sessions, differing weights count weight.
pub fn derive_strategy(sessions: &[Session]) -> AttendanceStrategy {
    if let Some(milestone) = sessions
        .iter()
        .find(|s| s.kind == SessionKind::Milestone && s.mandatory)
    {
        return AttendanceStrategy::MilestoneGated {
            session_id: milestone.session_id,
        };
    }

    if sessions.len() <= 1 {
        return AttendanceStrategy::Binary;
    }

    let first = sessions[0].weight;
    let uniform = sessions
        .iter()
        .all(|s| (s.weight - first).abs() < WEIGHT_EPSILON);

    if uniform {
        AttendanceStrategy::UniformPercentage
    } else {
        AttendanceStrategy::WeightedPercentage
    }
}
