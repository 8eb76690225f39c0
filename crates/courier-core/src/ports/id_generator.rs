//! IdGenerator port.
//!
//! Ids are ULIDs stamped with the injected clock's time, so a `FixedClock`
//! gives predictable timestamps while the random part keeps them unique.
//! Within one generator ids are strictly increasing, which makes job ids a
//! FIFO tie-break for jobs created at the same instant.

use std::sync::Mutex;

use ulid::Ulid;

use crate::domain::ids::{AuditId, JobId, LeaseId};
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate_job_id(&self) -> JobId;

    fn generate_lease_id(&self) -> LeaseId;

    fn generate_audit_id(&self) -> AuditId;
}

/// ULID generator driven by a [`Clock`].
pub struct UlidGenerator<C> {
    clock: C,
    last: Mutex<Option<Ulid>>,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            last: Mutex::new(None),
        }
    }

    fn next(&self) -> Ulid {
        let timestamp_ms = u64::try_from(self.clock.now().timestamp_millis()).unwrap_or(0);
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let ulid = match *last {
            // same millisecond (or a clock set backwards): bump the previous id
            Some(prev) if prev.timestamp_ms() >= timestamp_ms => prev
                .increment()
                .unwrap_or_else(|| Ulid::from_parts(prev.timestamp_ms().saturating_add(1), 0)),
            _ => Ulid::from_parts(timestamp_ms, rand::random()),
        };
        *last = Some(ulid);
        ulid
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_job_id(&self) -> JobId {
        JobId::from(self.next())
    }

    fn generate_lease_id(&self) -> LeaseId {
        LeaseId::from(self.next())
    }

    fn generate_audit_id(&self) -> AuditId {
        AuditId::from(self.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);

        let id1 = id_gen.generate_job_id();
        let id2 = id_gen.generate_job_id();

        assert_ne!(id1, id2);
    }

    #[test]
    fn ids_stay_ordered_when_the_clock_goes_back() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
        let id_gen = UlidGenerator::new(clock.clone());

        let before = id_gen.generate_job_id();
        clock.set(Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap());
        let after = id_gen.generate_job_id();

        assert!(before < after);
    }

    #[test]
    fn fixed_clock_pins_the_timestamp_part() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let id1 = id_gen.generate_lease_id();
        let id2 = id_gen.generate_lease_id();

        assert!(id1 < id2);
        assert_eq!(id1.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
        assert_eq!(id2.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
    }
}
