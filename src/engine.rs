//! The process-wide context object and the per-cycle entry point.
//!
//! One `Engine` exists per process, constructed at start and passed by
//! reference into the cycle driver. It owns the single database and goals
//! list, so "exactly one logical instance" is an ownership property rather
//! than a guarded global.

use crate::db::Database;
use crate::goals::GoalsList;
use crate::logic::{Predicate, Rule, RuleSet};

/// Driver-side sink for the actions chosen during a cycle. The driver is
/// expected to turn them into perceived events next cycle.
pub trait CycleHandler {
    fn set_events(&mut self, next_events: RuleSet);
}

pub struct Engine {
    pub db: Database,
    pub goals: GoalsList,
}

impl Engine {
    pub fn new(db: Database, goals: GoalsList) -> Self {
        Engine { db, goals }
    }

    /// One simulation cycle: apply the perceived events to the database,
    /// resume every pending goal against the updated store, and hand the
    /// chosen actions to the driver. Invoked once per cycle, in this order.
    pub fn cycle(&mut self, events: &[Predicate], handler: &mut dyn CycleHandler) {
        self.db.updates(events);
        let event_set =
            RuleSet::from_rules(events.iter().map(|e| Rule::fact(e.clone())).collect());
        let next_events = self.goals.solve_goals(&event_set, &self.db);
        handler.set_events(next_events);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::{Action, PostDeclaration};
    use crate::goals::{GoalSet, GoalTemplate};
    use crate::logic::{Clause, Term};

    fn ground(name: &str, args: &[&str]) -> Predicate {
        Predicate::new(name, args.iter().map(|a| Term::constant(*a)).collect())
    }

    fn open(name: &str, vars: &[(&str, usize)]) -> Predicate {
        Predicate::new(name, vars.iter().map(|(n, id)| Term::var(*n, *id)).collect())
    }

    #[derive(Default)]
    struct RecordingDriver {
        received: Vec<RuleSet>,
    }

    impl CycleHandler for RecordingDriver {
        fn set_events(&mut self, next_events: RuleSet) {
            self.received.push(next_events);
        }
    }

    struct AlwaysAdmissible(&'static str);

    impl Action for AlwaysAdmissible {
        fn name(&self) -> &str {
            self.0
        }

        fn is_admissible(&self, _: &Predicate, _: &RuleSet, _: &RuleSet) -> bool {
            true
        }
    }

    #[test]
    fn goal_completes_across_cycles_through_the_driver() {
        let _ = env_logger::builder().is_test(true).try_init();

        // task(T) :- pick(T), done(T); pick is an action whose effect
        // (via the initiator) is the done fluent
        let mut goal_set = GoalSet::new();
        goal_set.add_template(GoalTemplate::new(
            "task",
            vec![Rule::new(
                open("task", &[("T", 0)]),
                Clause::and(
                    Clause::Fact(open("pick", &[("T", 0)])),
                    Clause::Fact(open("done", &[("T", 0)])),
                ),
            )],
        ));

        let mut db = Database::new();
        db.register_action(Box::new(AlwaysAdmissible("pick")));
        db.add_initiator(
            PostDeclaration::new(
                open("pick", &[("X", 0)]),
                open("done", &[("X", 0)]),
                vec![0],
            )
            .unwrap(),
        );

        let mut engine = Engine::new(db, GoalsList::new(goal_set));
        engine
            .goals
            .add_goal(ground("task", &["box1"]), &engine.db.rule_set())
            .unwrap();

        let mut driver = RecordingDriver::default();

        // cycle 1: nothing perceived; the goal parks and chooses the action
        engine.cycle(&[], &mut driver);
        assert_eq!(engine.goals.len(), 1);
        let chosen: Vec<Predicate> = driver.received[0].iter().map(|r| r.head.clone()).collect();
        assert_eq!(chosen, vec![ground("pick", &["box1"])]);

        // cycle 2: the driver feeds the action back as a perceived event
        engine.cycle(&chosen, &mut driver);
        assert!(engine.goals.is_empty(), "goal solved on resumption");
        assert!(driver.received[1].is_empty());
        assert_eq!(
            engine.db.snapshot().facts,
            vec![ground("done", &["box1"])],
            "the initiator recorded the action's effect"
        );
    }
}
