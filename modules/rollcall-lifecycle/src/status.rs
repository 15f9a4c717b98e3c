//! The status machine. Pure functions of the event's time windows, the
//! stored status, and a caller-supplied `now`. No I/O, no side effects.

use chrono::{DateTime, Utc};

use rollcall_common::{CertificateRelease, Event, EventStatus};

/// The linear life stages in order. `Cancelled` sits outside the chain.
pub const STATUS_CHAIN: [EventStatus; 8] = [
    EventStatus::Draft,
    EventStatus::Upcoming,
    EventStatus::RegistrationOpen,
    EventStatus::RegistrationClosed,
    EventStatus::Ongoing,
    EventStatus::Completed,
    EventStatus::CertificateAvailable,
    EventStatus::Archived,
];

/// Compute the state this event should be in right now.
///
/// Idempotent: the answer depends only on the event's timestamps, its
/// stored status, and `now`, never on how many times or how late it is
/// checked. Terminal states and `Draft` (publishing is an admin act, not a
/// time transition) stay put; a forward admin override acts as a floor the
/// time computation never rolls back.
pub fn target_status(event: &Event, now: DateTime<Utc>) -> EventStatus {
    let stored = event.status;
    if stored.is_terminal() || stored == EventStatus::Draft {
        return stored;
    }

    let w = &event.windows;
    let time_target = if now < w.registration_start {
        EventStatus::Upcoming
    } else if now < w.registration_end {
        EventStatus::RegistrationOpen
    } else if now < w.start {
        EventStatus::RegistrationClosed
    } else if now < w.end {
        EventStatus::Ongoing
    } else {
        let released = event.certificate_release == CertificateRelease::Automatic
            || event.certificates_released;
        if !released {
            EventStatus::Completed
        } else if now < w.certificate_end {
            EventStatus::CertificateAvailable
        } else {
            EventStatus::Archived
        }
    };

    if stored.phase_index() > time_target.phase_index() {
        stored
    } else {
        time_target
    }
}

/// Every state between `from` (exclusive) and `to` (inclusive), in chain
/// order. Applying them one at a time preserves side-effect ordering when
/// evaluation happens late: a delayed tick replays each transition instead
/// of jumping. Empty when `to` is not strictly ahead of `from` on the
/// chain.
pub fn transition_path(from: EventStatus, to: EventStatus) -> Vec<EventStatus> {
    match (from.phase_index(), to.phase_index()) {
        (Some(a), Some(b)) if b > a => STATUS_CHAIN[(a as usize + 1)..=(b as usize)].to_vec(),
        _ => Vec::new(),
    }
}
