use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use crate::config::AssignmentStrategy;
use crate::inquiry::domain::Department;

/// A consultant available for assignment within one department.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consultant {
    pub id: String,
    pub skills: BTreeSet<String>,
    active_load: u32,
}

impl Consultant {
    pub fn new(id: impl Into<String>, skills: &[&str]) -> Self {
        Self {
            id: id.into(),
            skills: skills.iter().map(|s| (*s).to_string()).collect(),
            active_load: 0,
        }
    }

    pub fn active_load(&self) -> u32 {
        self.active_load
    }
}

#[derive(Debug, Default)]
struct DepartmentRoster {
    consultants: Vec<Consultant>,
    cursor: usize,
}

impl DepartmentRoster {
    fn assign(&mut self, strategy: AssignmentStrategy, skill_tags: &[&str]) -> Option<String> {
        if self.consultants.is_empty() {
            return None;
        }

        let chosen = match strategy {
            AssignmentStrategy::RoundRobin => {
                let index = self.cursor % self.consultants.len();
                self.cursor = (index + 1) % self.consultants.len();
                index
            }
            AssignmentStrategy::SkillMatch => {
                let mut best: Option<usize> = None;
                for (index, consultant) in self.consultants.iter().enumerate() {
                    if !skill_tags
                        .iter()
                        .all(|tag| consultant.skills.contains(*tag))
                    {
                        continue;
                    }
                    best = Some(match best {
                        None => index,
                        Some(current) => {
                            let current_consultant = &self.consultants[current];
                            if consultant.active_load < current_consultant.active_load
                                || (consultant.active_load == current_consultant.active_load
                                    && consultant.id < current_consultant.id)
                            {
                                index
                            } else {
                                current
                            }
                        }
                    });
                }
                best?
            }
            AssignmentStrategy::LeastLoaded => {
                // Circular scan from the cursor so load ties rotate fairly.
                let len = self.consultants.len();
                let mut best = self.cursor % len;
                for offset in 1..len {
                    let index = (self.cursor + offset) % len;
                    if self.consultants[index].active_load < self.consultants[best].active_load {
                        best = index;
                    }
                }
                best
            }
        };

        let consultant = &mut self.consultants[chosen];
        consultant.active_load += 1;
        Some(consultant.id.clone())
    }
}

/// Per-department consultant queues with fine-grained locking.
///
/// Mutation is serialized per department; assignments in different
/// departments never contend on a shared lock.
pub struct ConsultantPool {
    rosters: HashMap<Department, Mutex<DepartmentRoster>>,
}

impl ConsultantPool {
    pub fn new(roster: Vec<(Department, Vec<Consultant>)>) -> Self {
        let mut rosters: HashMap<Department, Mutex<DepartmentRoster>> = Department::ALL
            .into_iter()
            .map(|department| (department, Mutex::new(DepartmentRoster::default())))
            .collect();
        for (department, consultants) in roster {
            rosters.insert(
                department,
                Mutex::new(DepartmentRoster {
                    consultants,
                    cursor: 0,
                }),
            );
        }
        Self { rosters }
    }

    /// Built-in roster seeded with two consultants per line department.
    pub fn default_roster() -> Self {
        let skills = |department: Department| -> &'static [&'static str] {
            match department {
                Department::TechnicalSupport => &["technical_support"],
                Department::Finance => &["billing"],
                Department::Sales => &["sales"],
                Department::Hr => &["hr"],
                Department::Legal => &["legal"],
                Department::ProductManagement => &["product_feedback"],
                Department::Escalation | Department::General => &[],
            }
        };

        let named = |department: Department, names: [&str; 2]| {
            (
                department,
                names
                    .into_iter()
                    .map(|name| Consultant::new(name, skills(department)))
                    .collect(),
            )
        };

        Self::new(vec![
            named(
                Department::TechnicalSupport,
                ["Alice Johnson", "Bob Smith"],
            ),
            named(Department::Finance, ["Carol Davis", "David Wilson"]),
            named(Department::Sales, ["Eva Brown", "Frank Miller"]),
            named(Department::Hr, ["Grace Lee", "Henry Taylor"]),
            named(Department::Legal, ["Ivy Chen", "Jack Anderson"]),
            named(
                Department::ProductManagement,
                ["Kate Rodriguez", "Liam Thompson"],
            ),
            named(Department::Escalation, ["Mia Flores", "Noah Patel"]),
        ])
    }

    /// Assign a consultant from the department's roster, incrementing their
    /// active load. An empty roster yields `None`; that is not an error.
    pub fn assign(
        &self,
        department: Department,
        strategy: AssignmentStrategy,
        skill_tags: &[&str],
    ) -> Option<String> {
        let roster = self.rosters.get(&department)?;
        roster
            .lock()
            .expect("department roster poisoned")
            .assign(strategy, skill_tags)
    }

    /// Current active load of a consultant, if they exist.
    pub fn active_load(&self, department: Department, consultant_id: &str) -> Option<u32> {
        let roster = self.rosters.get(&department)?;
        let guard = roster.lock().expect("department roster poisoned");
        guard
            .consultants
            .iter()
            .find(|c| c.id == consultant_id)
            .map(Consultant::active_load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with(consultants: Vec<Consultant>) -> ConsultantPool {
        ConsultantPool::new(vec![(Department::Finance, consultants)])
    }

    #[test]
    fn round_robin_cycles_in_order() {
        let pool = pool_with(vec![
            Consultant::new("amy", &[]),
            Consultant::new("ben", &[]),
        ]);

        let first = pool.assign(Department::Finance, AssignmentStrategy::RoundRobin, &[]);
        let second = pool.assign(Department::Finance, AssignmentStrategy::RoundRobin, &[]);
        let third = pool.assign(Department::Finance, AssignmentStrategy::RoundRobin, &[]);

        assert_eq!(first.as_deref(), Some("amy"));
        assert_eq!(second.as_deref(), Some("ben"));
        assert_eq!(third.as_deref(), Some("amy"));
    }

    #[test]
    fn assignment_increments_active_load() {
        let pool = pool_with(vec![Consultant::new("amy", &[])]);
        pool.assign(Department::Finance, AssignmentStrategy::RoundRobin, &[]);
        pool.assign(Department::Finance, AssignmentStrategy::RoundRobin, &[]);
        assert_eq!(pool.active_load(Department::Finance, "amy"), Some(2));
    }

    #[test]
    fn skill_match_requires_all_tags_and_prefers_least_loaded() {
        let pool = pool_with(vec![
            Consultant::new("amy", &["billing"]),
            Consultant::new("ben", &["billing", "refunds"]),
            Consultant::new("cal", &[]),
        ]);

        let first = pool.assign(
            Department::Finance,
            AssignmentStrategy::SkillMatch,
            &["billing"],
        );
        // amy and ben both qualify at load zero; the lexicographically
        // smaller id wins the tie.
        assert_eq!(first.as_deref(), Some("amy"));

        let second = pool.assign(
            Department::Finance,
            AssignmentStrategy::SkillMatch,
            &["billing"],
        );
        assert_eq!(second.as_deref(), Some("ben"));

        let refunds_only = pool.assign(
            Department::Finance,
            AssignmentStrategy::SkillMatch,
            &["billing", "refunds"],
        );
        assert_eq!(refunds_only.as_deref(), Some("ben"));
    }

    #[test]
    fn skill_match_with_no_qualified_consultant_is_none() {
        let pool = pool_with(vec![Consultant::new("amy", &["billing"])]);
        let assigned = pool.assign(
            Department::Finance,
            AssignmentStrategy::SkillMatch,
            &["legal"],
        );
        assert!(assigned.is_none());
    }

    #[test]
    fn least_loaded_picks_minimum_load() {
        let pool = pool_with(vec![
            Consultant::new("amy", &[]),
            Consultant::new("ben", &[]),
        ]);

        pool.assign(Department::Finance, AssignmentStrategy::RoundRobin, &[]);
        let next = pool.assign(Department::Finance, AssignmentStrategy::LeastLoaded, &[]);
        assert_eq!(next.as_deref(), Some("ben"));
    }

    #[test]
    fn empty_department_yields_none() {
        let pool = ConsultantPool::new(Vec::new());
        assert!(pool
            .assign(Department::General, AssignmentStrategy::RoundRobin, &[])
            .is_none());
    }

    #[test]
    fn departments_do_not_share_state() {
        let pool = ConsultantPool::default_roster();
        let finance = pool.assign(Department::Finance, AssignmentStrategy::RoundRobin, &[]);
        let sales = pool.assign(Department::Sales, AssignmentStrategy::RoundRobin, &[]);
        assert_eq!(finance.as_deref(), Some("Carol Davis"));
        assert_eq!(sales.as_deref(), Some("Eva Brown"));
    }
}
