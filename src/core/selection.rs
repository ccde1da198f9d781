use crate::domain::model::Slot;
use chrono::NaiveDateTime;

/// Pick the best candidate from a batch of slots: the earliest one starting
/// at or after `threshold`. Ties on the start timestamp keep the first slot
/// in input order, so the choice is stable across identical batches.
pub fn choose(slots: &[Slot], threshold: NaiveDateTime) -> Option<&Slot> {
    let mut best: Option<&Slot> = None;
    for slot in slots {
        if slot.start < threshold {
            continue;
        }
        match best {
            Some(current) if current.start <= slot.start => {}
            _ => best = Some(slot),
        }
    }
    best
}
