use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;

use crate::limits::{MAX_FLOOR, MAX_SCHEDULE_SLOTS};
use crate::model::*;

use super::EngineError;

/// Cleaning staff and their duty slots.
///
/// `slots` is the reverse index of every employee's `assignments`; both are
/// only changed together by `apply_*`, so a slot has at most one holder.
#[derive(Debug, Default)]
pub struct DutyRoster {
    employees: BTreeMap<EmployeeId, Employee>,
    slots: HashMap<DutySlot, EmployeeId>,
}

impl DutyRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.employees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.employees.is_empty()
    }

    pub fn get(&self, id: EmployeeId) -> Option<&Employee> {
        self.employees.get(&id)
    }

    pub fn employees(&self) -> impl Iterator<Item = &Employee> {
        self.employees.values()
    }

    /// The active employee holding `slot`, if any.
    pub fn holder(&self, slot: DutySlot) -> Option<&Employee> {
        self.slots
            .get(&slot)
            .and_then(|id| self.employees.get(id))
            .filter(|e| e.is_active())
    }

    /// Every held slot, sorted by (floor, weekday).
    pub fn assignments(&self) -> Vec<(DutySlot, EmployeeId)> {
        let mut all: Vec<_> = self.slots.iter().map(|(s, e)| (*s, *e)).collect();
        all.sort();
        all
    }

    pub fn check_schedulable(&self, id: EmployeeId) -> Result<&Employee, EngineError> {
        let employee = self.get(id).ok_or(EngineError::UnknownEmployee(id))?;
        if !employee.is_active() {
            return Err(EngineError::EmployeeFired(id));
        }
        Ok(employee)
    }

    pub fn check_fireable(
        &self,
        id: EmployeeId,
        termination_date: NaiveDate,
    ) -> Result<&Employee, EngineError> {
        let employee = self.check_schedulable(id)?;
        if termination_date < employee.hire_date {
            return Err(EngineError::InvalidDate {
                date: termination_date,
                reason: "termination precedes hire date",
            });
        }
        Ok(employee)
    }

    // ── Apply (infallible, replay-safe) ──────────────────────────

    pub fn apply_hired(&mut self, employee: Employee) {
        self.employees.insert(employee.id, employee);
    }

    pub fn apply_fired(&mut self, id: EmployeeId, termination_date: NaiveDate) {
        self.vacate_all(id);
        if let Some(employee) = self.employees.get_mut(&id) {
            employee.status = EmployeeStatus::Fired;
            employee.termination_date = Some(termination_date);
        }
    }

    /// Replace `id`'s whole slot set. Returns slots taken from other holders.
    pub fn apply_schedule(&mut self, id: EmployeeId, slots: &[DutySlot]) -> Vec<(DutySlot, EmployeeId)> {
        self.vacate_all(id);
        let mut taken = Vec::new();
        for slot in slots {
            if let Some(prev) = self.slots.insert(*slot, id)
                && prev != id
            {
                if let Some(prev_employee) = self.employees.get_mut(&prev) {
                    prev_employee.assignments.retain(|s| s != slot);
                }
                taken.push((*slot, prev));
            }
        }
        if let Some(employee) = self.employees.get_mut(&id) {
            employee.assignments = slots.to_vec();
        }
        taken
    }

    fn vacate_all(&mut self, id: EmployeeId) {
        let Some(employee) = self.employees.get_mut(&id) else {
            return;
        };
        for slot in employee.assignments.drain(..) {
            if self.slots.get(&slot) == Some(&id) {
                self.slots.remove(&slot);
            }
        }
    }
}

/// Validate and canonicalize a requested slot set: deduplicated, sorted.
pub(crate) fn normalize_slots(slots: &[DutySlot]) -> Result<Vec<DutySlot>, EngineError> {
    let mut set = BTreeSet::new();
    for slot in slots {
        if slot.floor == 0 || slot.floor > MAX_FLOOR {
            return Err(EngineError::Validation(format!(
                "floor {} out of range 1..={MAX_FLOOR}",
                slot.floor
            )));
        }
        set.insert(*slot);
    }
    if set.len() > MAX_SCHEDULE_SLOTS {
        return Err(EngineError::LimitExceeded("too many schedule slots"));
    }
    Ok(set.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn hire(roster: &mut DutyRoster, id: u64, last: &str) {
        roster.apply_hired(Employee {
            id: EmployeeId(id),
            last_name: last.into(),
            first_name: "A".into(),
            middle_name: None,
            status: EmployeeStatus::Active,
            hire_date: d("2023-01-01"),
            termination_date: None,
            assignments: Vec::new(),
        });
    }

    #[test]
    fn reassignment_vacates_previous_holder() {
        let mut roster = DutyRoster::new();
        hire(&mut roster, 1, "Petrova");
        hire(&mut roster, 2, "Sidorova");
        let slot = DutySlot::new(2, Weekday::Mon);

        roster.apply_schedule(EmployeeId(1), &[slot, DutySlot::new(3, Weekday::Tue)]);
        assert_eq!(roster.holder(slot).unwrap().id, EmployeeId(1));

        let taken = roster.apply_schedule(EmployeeId(2), &[slot]);
        assert_eq!(taken, vec![(slot, EmployeeId(1))]);
        assert_eq!(roster.holder(slot).unwrap().id, EmployeeId(2));
        assert_eq!(
            roster.get(EmployeeId(1)).unwrap().assignments,
            vec![DutySlot::new(3, Weekday::Tue)]
        );
    }

    #[test]
    fn replace_drops_old_slots() {
        let mut roster = DutyRoster::new();
        hire(&mut roster, 1, "Petrova");
        roster.apply_schedule(EmployeeId(1), &[DutySlot::new(1, Weekday::Mon)]);
        roster.apply_schedule(EmployeeId(1), &[DutySlot::new(1, Weekday::Fri)]);
        assert!(roster.holder(DutySlot::new(1, Weekday::Mon)).is_none());
        assert_eq!(roster.assignments(), vec![(DutySlot::new(1, Weekday::Fri), EmployeeId(1))]);
    }

    #[test]
    fn firing_vacates_and_blocks_scheduling() {
        let mut roster = DutyRoster::new();
        hire(&mut roster, 1, "Petrova");
        roster.apply_schedule(EmployeeId(1), &[DutySlot::new(4, Weekday::Sun)]);
        roster.apply_fired(EmployeeId(1), d("2024-05-01"));

        assert!(roster.holder(DutySlot::new(4, Weekday::Sun)).is_none());
        assert!(roster.assignments().is_empty());
        let fired = roster.get(EmployeeId(1)).unwrap();
        assert_eq!(fired.status, EmployeeStatus::Fired);
        assert_eq!(fired.termination_date, Some(d("2024-05-01")));
        assert!(matches!(
            roster.check_schedulable(EmployeeId(1)),
            Err(EngineError::EmployeeFired(_))
        ));
        assert!(matches!(
            roster.check_fireable(EmployeeId(1), d("2024-06-01")),
            Err(EngineError::EmployeeFired(_))
        ));
    }

    #[test]
    fn termination_before_hire_rejected() {
        let mut roster = DutyRoster::new();
        hire(&mut roster, 1, "Petrova");
        assert!(matches!(
            roster.check_fireable(EmployeeId(1), d("2022-12-31")),
            Err(EngineError::InvalidDate { .. })
        ));
        assert!(matches!(
            roster.check_fireable(EmployeeId(9), d("2024-01-01")),
            Err(EngineError::UnknownEmployee(_))
        ));
    }

    #[test]
    fn normalize_dedupes_and_sorts() {
        let slots = normalize_slots(&[
            DutySlot::new(3, Weekday::Mon),
            DutySlot::new(1, Weekday::Wed),
            DutySlot::new(3, Weekday::Mon),
        ])
        .unwrap();
        assert_eq!(slots, vec![DutySlot::new(1, Weekday::Wed), DutySlot::new(3, Weekday::Mon)]);
        assert!(normalize_slots(&[DutySlot::new(0, Weekday::Mon)]).is_err());
        assert!(normalize_slots(&[]).unwrap().is_empty());
    }
}
