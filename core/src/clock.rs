//! Clock boundary — every deadline computation receives its `now` from here,
//! which keeps the engine deterministic and testable.

use chrono::{DateTime, Duration, Utc};
use std::cell::RefCell;

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock pinned to an explicit instant. Advance it to simulate the
/// passage of statutory deadlines without sleeping.
pub struct FixedClock {
    at: RefCell<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at: RefCell::new(at) }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.at.borrow_mut() = at;
    }

    pub fn advance_hours(&self, hours: i64) {
        let mut at = self.at.borrow_mut();
        *at += Duration::hours(hours);
    }

    pub fn advance_minutes(&self, minutes: i64) {
        let mut at = self.at.borrow_mut();
        *at += Duration::minutes(minutes);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.at.borrow()
    }
}

// Lets a test hold on to an Rc<FixedClock> and hand the engine a clone.
impl<C: Clock> Clock for std::rc::Rc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}
